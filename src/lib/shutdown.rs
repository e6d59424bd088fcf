use std::time::Duration;

use tokio::sync::watch;

/// Sleep for `period`, returning `true` early if shutdown was signalled
/// (or the signalling side went away).
pub async fn sleep_or_shutdown(period: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    let closed = tokio::select! {
        _ = tokio::time::sleep(period) => return false,
        changed = shutdown.changed() => changed.is_err(),
    };
    closed || *shutdown.borrow()
}
