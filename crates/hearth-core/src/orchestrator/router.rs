//! PriorityRouter: walks the handler list top to bottom, first match wins.

use super::handlers::{standard_handlers, Handler, HandlerResult, ReplyPlan, TurnContext};
use crate::shared::HandlerId;

pub struct PriorityRouter {
    handlers: Vec<Box<dyn Handler>>,
}

impl Default for PriorityRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PriorityRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.order()).finish()
    }
}

impl PriorityRouter {
    pub fn new() -> Self {
        Self {
            handlers: standard_handlers(),
        }
    }

    /// Handler ids in evaluation order.
    pub fn order(&self) -> Vec<HandlerId> {
        self.handlers.iter().map(|h| h.id()).collect()
    }

    /// Plan from the first handler that matches. The adaptive handler always matches, so the
    /// trailing default only matters for a router built without it.
    pub fn dispatch(&self, ctx: &TurnContext<'_>) -> ReplyPlan {
        for handler in &self.handlers {
            match handler.evaluate(ctx) {
                HandlerResult::Matched(plan) => {
                    tracing::debug!(
                        target: "hearth::router",
                        handler = %plan.handler,
                        level = plan.handler.level(),
                        message_count = ctx.state.message_count(),
                        "Handler selected"
                    );
                    return plan;
                }
                HandlerResult::NoMatch => {
                    tracing::trace!(target: "hearth::router", handler = %handler.id(), "No match");
                }
            }
        }
        ReplyPlan::template(HandlerId::Adaptive, &["adaptive"], ctx)
    }

    /// The id of the handler that would produce the reply.
    pub fn route(&self, ctx: &TurnContext<'_>) -> HandlerId {
        self.dispatch(ctx).handler
    }
}
