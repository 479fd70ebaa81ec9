use std::sync::Weak;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;

use super::connection::Inner;
use super::{Config, ConnectionState};

/// The backoff delay before reconnect attempt `attempt`, without jitter.
pub(super) fn base_delay(config: &Config, attempt: u32) -> Duration {
    let multiplier = config.reconnect_backoff_multiplier.max(1.0);
    let exact = config.reconnect_initial_delay.as_secs_f64()
        * multiplier.powi(attempt.min(i32::MAX as u32) as i32);

    Duration::from_secs_f64(exact.min(config.reconnect_max_delay.as_secs_f64()))
}

/// The backoff delay with up to ±10% of jitter applied.
pub(super) fn backoff_delay(config: &Config, attempt: u32) -> Duration {
    let base = base_delay(config, attempt);
    let jitter = rand::thread_rng().gen_range(0.9..=1.1);
    Duration::from_secs_f64(base.as_secs_f64() * jitter)
}

/// Watch for the FAILED state and drive reconnect attempts with
/// exponential backoff.
///
/// The attempt counter resets every time a connection is successfully
/// established; once `max_reconnect_attempts` consecutive attempts fail,
/// the connection remains FAILED until something calls `connect` again.
pub(super) async fn supervise(
    inner: Weak<Inner>,
    mut state_rx: watch::Receiver<ConnectionState>,
) {
    loop {
        if state_rx.changed().await.is_err() {
            return;
        }

        if *state_rx.borrow_and_update() != ConnectionState::Failed {
            continue;
        }

        let Some(strong) = inner.upgrade() else {
            return;
        };

        if strong.is_closed() || !strong.config.auto_reconnect_enabled {
            continue;
        }

        let mut attempt = 0;

        while attempt < strong.config.max_reconnect_attempts {
            strong.transition(ConnectionState::Reconnecting);

            let delay = backoff_delay(&strong.config, attempt);
            tracing::debug!(attempt, ?delay, "scheduling reconnect");
            tokio::time::sleep(delay).await;

            if strong.is_closed() {
                return;
            }

            match strong.establish().await {
                Ok(()) => break,
                Err(error) => {
                    tracing::warn!(attempt, %error, "reconnect attempt failed");
                    strong.transition(ConnectionState::Failed);
                    attempt += 1;
                }
            }
        }

        // Transitions this loop caused are not new information.
        let _ = state_rx.borrow_and_update();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::Config;
    use super::{backoff_delay, base_delay};

    fn config() -> Config {
        Config {
            reconnect_initial_delay: Duration::from_millis(100),
            reconnect_max_delay: Duration::from_secs(5),
            reconnect_backoff_multiplier: 2.0,
            ..Config::default()
        }
    }

    #[test]
    fn delays_grow_geometrically_until_capped() {
        let config = config();

        let delays = (0..8)
            .map(|attempt| base_delay(&config, attempt))
            .collect::<Vec<_>>();

        assert_eq!(
            delays,
            [
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
                Duration::from_millis(3200),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn multiplier_below_one_is_clamped() {
        let config = Config {
            reconnect_backoff_multiplier: 0.5,
            ..config()
        };

        assert_eq!(base_delay(&config, 0), base_delay(&config, 3));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let config = config();

        for attempt in 0..6 {
            let base = base_delay(&config, attempt).as_secs_f64();

            for _ in 0..32 {
                let jittered = backoff_delay(&config, attempt).as_secs_f64();
                assert!((0.9 * base..=1.1 * base + f64::EPSILON).contains(&jittered));
            }
        }
    }
}
