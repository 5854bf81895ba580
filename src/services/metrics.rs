// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::services::agent::scheduler::AgentStats;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

pub async fn spawn_metrics_server(port: u16, stats: Arc<AgentStats>) -> Option<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!("Metrics server failed to bind: {}", e);
            return None;
        }
    };

    let local = listener.local_addr().ok();
    if let Some(addr) = local {
        tracing::info!("Metrics server listening on {}", addr);
    }

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let body = render_metrics(&stats);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
                Err(e) => {
                    tracing::warn!("Metrics accept error: {}", e);
                    continue;
                }
            }
        }
    });

    local
}

fn render_metrics(stats: &AgentStats) -> String {
    format!(
        concat!(
            "# TYPE agent_cycles counter\nagent_cycles {}\n",
            "# TYPE agent_accounts_processed counter\nagent_accounts_processed {}\n",
            "# TYPE agent_accounts_held counter\nagent_accounts_held {}\n",
            "# TYPE agent_accounts_rebalanced counter\nagent_accounts_rebalanced {}\n",
            "# TYPE agent_accounts_skipped counter\nagent_accounts_skipped {}\n",
            "# TYPE agent_accounts_failed counter\nagent_accounts_failed {}\n"
        ),
        stats.cycles.load(Ordering::Relaxed),
        stats.processed.load(Ordering::Relaxed),
        stats.held.load(Ordering::Relaxed),
        stats.rebalanced.load(Ordering::Relaxed),
        stats.skipped.load(Ordering::Relaxed),
        stats.failed.load(Ordering::Relaxed),
    )
}
