use std::sync::Weak;

use tokio::time::MissedTickBehavior;

use crate::error::ErrorCategory;
use crate::org_freedesktop_dbus;

use super::connection::Inner;
use super::ConnectionState;

/// Periodically ping the bus and track consecutive failures.
///
/// The first failed ping degrades CONNECTED to UNHEALTHY; once the
/// configured threshold of consecutive failures is reached the session is
/// torn down as FAILED. A successful ping restores CONNECTED. Sends are
/// never suspended while UNHEALTHY.
pub(super) async fn monitor(inner: Weak<Inner>) {
    let period = {
        let Some(strong) = inner.upgrade() else {
            return;
        };

        strong.config.health_check_interval
    };

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so a fresh connection is
    // not pinged right away.
    ticker.tick().await;

    let mut failures = 0u32;

    loop {
        ticker.tick().await;

        let Some(strong) = inner.upgrade() else {
            return;
        };

        if strong.is_closed() {
            return;
        }

        if !strong.state().sendable() {
            failures = 0;
            continue;
        }

        let result = strong
            .send_request_with_timeout(
                org_freedesktop_dbus::ping(),
                strong.config.health_check_timeout,
            )
            .await;

        match result {
            // An error reply still proves the peer is processing messages.
            Ok(..) => {
                failures = 0;

                if strong.state() == ConnectionState::Unhealthy {
                    strong.transition(ConnectionState::Connected);
                }
            }
            Err(error) if error.category() == ErrorCategory::Remote => {
                failures = 0;

                if strong.state() == ConnectionState::Unhealthy {
                    strong.transition(ConnectionState::Connected);
                }
            }
            Err(error) => {
                failures += 1;
                tracing::debug!(failures, %error, "health check failed");

                if failures >= strong.config.health_failure_threshold {
                    failures = 0;
                    strong.fail_session(error);
                } else if strong.state() == ConnectionState::Connected {
                    strong.transition(ConnectionState::Unhealthy);
                }
            }
        }
    }
}
