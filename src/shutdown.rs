use std::future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;

pub struct Trigger(watch::Sender<bool>);

impl Trigger {
    pub fn fire(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Clone)]
pub struct Shutdown(watch::Receiver<bool>);

pub fn channel() -> (Trigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (Trigger(tx), Shutdown(rx))
}

impl Shutdown {
    pub fn is_requested(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the trigger fires. Never resolves if the trigger is dropped unfired.
    pub async fn requested(&mut self) {
        if self.0.wait_for(|x| *x).await.is_err() {
            future::pending::<()>().await;
        }
    }

    /// Sleeps for `period`; `false` when cut short by a shutdown request.
    pub async fn pause(&mut self, period: Duration) -> bool {
        tokio::select! {
            _ = sleep(period) => true,
            _ = self.requested() => false,
        }
    }
}
