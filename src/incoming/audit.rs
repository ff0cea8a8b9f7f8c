use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::constants::headers;
use crate::context::IncomingPhysicalContext;
use crate::message::{AddressTag, TransportOperation};
use crate::outgoing::capture_or_dispatch;
use crate::pipeline::{Behavior, Next, ProcessingResult, StageContext, StageInvoker};

/// Forwards a copy of every successfully processed envelope to the audit queue
///
/// The copy joins the outgoing operations of the envelope, so with an outbox
/// it is sent exactly once together with the handlers' messages.
pub struct AuditProcessedMessageBehavior {
    audit_address: String,
    endpoint_name: String,
}

impl AuditProcessedMessageBehavior {
    pub fn new(audit_address: impl Into<String>, endpoint_name: impl Into<String>) -> Self {
        Self {
            audit_address: audit_address.into(),
            endpoint_name: endpoint_name.into(),
        }
    }

    fn audit_operation(&self, context: &IncomingPhysicalContext) -> TransportOperation {
        let mut map = context.message.headers.clone();
        map.insert(
            headers::PROCESSING_ENDPOINT.to_string(),
            self.endpoint_name.clone(),
        );
        map.insert(
            headers::PROCESSING_STARTED.to_string(),
            context.started_at.to_rfc3339(),
        );
        map.insert(
            headers::PROCESSING_ENDED.to_string(),
            Utc::now().to_rfc3339(),
        );

        TransportOperation::new(
            context.message.message_id.clone(),
            AddressTag::unicast(self.audit_address.clone()),
            map,
            context.message.body.clone(),
        )
    }
}

#[async_trait]
impl Behavior<IncomingPhysicalContext> for AuditProcessedMessageBehavior {
    async fn invoke(
        &self,
        context: &mut IncomingPhysicalContext,
        next: Next<'_, IncomingPhysicalContext>,
    ) -> ProcessingResult<()> {
        next.run(context).await?;

        let operation = self.audit_operation(context);
        let pipelines = Arc::clone(context.behavior_context().pipelines());
        capture_or_dispatch(
            context.behavior_context(),
            operation,
            false,
            StageInvoker::new(pipelines.dispatch()),
        )
        .await
    }
}
