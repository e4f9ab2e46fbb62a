//! In-process delivery hooks
//!
//! Pre-send hooks run after parameter assembly and may mutate the
//! outgoing params; post-send hooks observe the report of a completed
//! send. Hooks are registered once at service build time and run in
//! registration order.

use crate::delivery::SendReport;
use crate::params::SendParams;
use mailrotor_storage::models::DeliveryServer;
use tracing::trace;

type PreSendHook = Box<dyn Fn(&DeliveryServer, &mut SendParams) + Send + Sync>;
type PostSendHook = Box<dyn Fn(&SendReport) + Send + Sync>;

#[derive(Default)]
pub struct HookBus {
    pre_send: Vec<PreSendHook>,
    post_send: Vec<PostSendHook>,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_pre_send<F>(&mut self, hook: F)
    where
        F: Fn(&DeliveryServer, &mut SendParams) + Send + Sync + 'static,
    {
        self.pre_send.push(Box::new(hook));
    }

    pub fn on_post_send<F>(&mut self, hook: F)
    where
        F: Fn(&SendReport) + Send + Sync + 'static,
    {
        self.post_send.push(Box::new(hook));
    }

    pub fn run_pre_send(&self, server: &DeliveryServer, params: &mut SendParams) {
        trace!(count = self.pre_send.len(), "running pre-send hooks");
        for hook in &self.pre_send {
            hook(server, params);
        }
    }

    pub fn run_post_send(&self, report: &SendReport) {
        trace!(count = self.post_send.len(), "running post-send hooks");
        for hook in &self.post_send {
            hook(report);
        }
    }
}
