use mediaflow_model::{Job, Notification};
use tracing::{debug, warn};

use super::{JobProcessor, OperationContext};

impl JobProcessor {
    /// Best-effort delivery of the job's state to its notification endpoint,
    /// falling back to the endpoint supplied with the request. Failures are
    /// logged and swallowed; the persisted state stands either way.
    pub(super) async fn notify(&self, ctx: &OperationContext, job: &Job) {
        let Some(endpoint) = job
            .notification_endpoint
            .as_deref()
            .or(ctx.notification_endpoint.as_deref())
        else {
            return;
        };

        let notification = match Notification::for_job(job) {
            Ok(notification) => notification,
            Err(err) => {
                warn!(endpoint, error = %err, "failed to encode job notification");
                return;
            }
        };

        match self.resources.send_notification(endpoint, &notification).await {
            Ok(()) => debug!(endpoint, status = %job.status, "notification delivered"),
            Err(err) => warn!(endpoint, error = %err, "notification delivery failed"),
        }
    }
}
