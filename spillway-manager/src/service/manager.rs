//! Pipeline manager
//!
//! Dispatches an instruction to the add, update or delete path, behind the
//! configured middleware chain.

use std::sync::Arc;

use futures::FutureExt;
use spillway_core::{Instruction, Operation};

use super::adder::add_pipeline;
use super::remover::delete_pipeline;
use super::updater::update_pipeline;
use super::{Collaborators, ManagerSettings};
use crate::context::Context;
use crate::error::Result;
use crate::middleware::{Handler, Middleware, wrap_middleware};

/// State shared by every handled instruction
struct Core {
    collaborators: Collaborators,
    settings: ManagerSettings,
}

impl Core {
    async fn dispatch(&self, ctx: &Context, instruction: &Instruction) -> Result<()> {
        let constants = instruction.constants.as_ref();
        let config = &instruction.config;

        match instruction.operation {
            Operation::Add => {
                add_pipeline(ctx, &self.collaborators, &self.settings, constants, config).await
            }
            Operation::Update => {
                update_pipeline(ctx, &self.collaborators, constants, config).await
            }
            Operation::Delete => {
                delete_pipeline(ctx, &self.collaborators, constants, config).await
            }
        }
    }
}

/// Handles pipeline instructions
///
/// Built once at startup with its collaborators and shared across every
/// event.
pub struct PipelineManager {
    core: Arc<Core>,
    handler: Handler,
}

impl PipelineManager {
    pub fn new(collaborators: Collaborators, settings: ManagerSettings) -> Self {
        let core = Arc::new(Core {
            collaborators,
            settings,
        });
        let handler = core_handler(Arc::clone(&core));
        Self { core, handler }
    }

    /// Installs middleware around the handler, first supplied outermost
    ///
    /// Replaces any middleware installed earlier.
    pub fn use_middleware(mut self, middleware: &[Middleware]) -> Self {
        self.handler = wrap_middleware(core_handler(Arc::clone(&self.core)), middleware);
        self
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.core.settings
    }

    /// Handles one instruction through the middleware chain
    pub async fn handle(&self, ctx: Context, instruction: Instruction) -> Result<()> {
        (self.handler)(ctx, instruction).await
    }
}

fn core_handler(core: Arc<Core>) -> Handler {
    Arc::new(move |ctx: Context, instruction: Instruction| {
        let core = Arc::clone(&core);
        async move { core.dispatch(&ctx, &instruction).await }.boxed()
    })
}
