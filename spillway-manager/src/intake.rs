//! Change intake
//!
//! Reads change events, one JSON document per line, turns each record into
//! an instruction and hands it to the pipeline manager. A failing event is
//! logged and intake moves on; redelivery is decided upstream.

use anyhow::{Context as AnyhowContext, Result};
use spillway_core::InstructionBuilder;
use spillway_core::dto::change::ChangeEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use crate::context::Context;
use crate::error::PipelineError;
use crate::service::PipelineManager;

/// Counts of one intake run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeSummary {
    pub events: usize,
    pub failed: usize,
}

pub struct ChangeIntake {
    builder: InstructionBuilder,
    manager: Arc<PipelineManager>,
    request_timeout: Duration,
}

impl ChangeIntake {
    pub fn new(
        builder: InstructionBuilder,
        manager: Arc<PipelineManager>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            builder,
            manager,
            request_timeout,
        }
    }

    /// Handles every record of one event in order
    ///
    /// Stops at the first failing record and returns its error; the records
    /// before it stay applied.
    pub async fn handle_event(
        &self,
        event: &ChangeEvent,
        shutdown: &CancellationToken,
    ) -> std::result::Result<usize, PipelineError> {
        for record in &event.records {
            let ctx = Context::new(shutdown.child_token()).with_timeout(self.request_timeout);
            let span = info_span!(
                "change_record",
                request_id = %ctx.request_id(),
                event_id = record.event_id.as_deref().unwrap_or("-"),
            );

            async {
                let instruction = self.builder.build(record)?;
                debug!(
                    pipeline_id = %instruction.id(),
                    operation = %instruction.operation,
                    "built instruction"
                );
                self.manager.handle(ctx, instruction).await
            }
            .instrument(span)
            .await?;
        }
        Ok(event.records.len())
    }

    /// Reads events line by line until EOF or shutdown
    pub async fn run<R>(&self, reader: R, shutdown: CancellationToken) -> Result<IntakeSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut summary = IntakeSummary::default();
        let mut line_number = 0usize;

        loop {
            let line = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping change intake");
                    break;
                }

                line = lines.next_line() => line.context("Failed to read change events")?,
            };
            let Some(line) = line else {
                debug!("change event stream ended");
                break;
            };
            line_number += 1;

            if line.trim().is_empty() {
                continue;
            }
            summary.events += 1;

            let event: ChangeEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(e) => {
                    summary.failed += 1;
                    error!(line = line_number, "Malformed change event: {}", e);
                    continue;
                }
            };

            match self.handle_event(&event, &shutdown).await {
                Ok(records) => debug!(line = line_number, records, "change event handled"),
                Err(e) => {
                    summary.failed += 1;
                    error!(line = line_number, "Change event failed: {}", e);
                }
            }
        }

        info!(
            events = summary.events,
            failed = summary.failed,
            "change intake finished"
        );
        Ok(summary)
    }
}
