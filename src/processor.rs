//! Job processor: glue between operation requests and the executor.
//!
//! For each request it probes when the operation validates against file
//! metadata, renders the command plan, materializes any scratch files, runs
//! the planned commands in order, and reports the first non-succeeded step.

use crate::config::Config;
use crate::pool::JobRunner;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use vidmill_av::plan::{self, BuildContext, PlannedCommand, ScratchFile};
use vidmill_av::{
    Error, ExecutionResult, MediaFileInfo, OperationRequest, ProcessExecutor, Prober, Result,
    ToolPaths,
};

/// Executes operation requests end to end.
pub struct JobProcessor {
    executor: ProcessExecutor,
    prober: Prober,
    output_dir: PathBuf,
    threads: usize,
}

impl JobProcessor {
    pub fn new(config: &Config, tools: ToolPaths) -> Self {
        Self {
            executor: ProcessExecutor::new(tools.ffmpeg)
                .with_stderr_tail(config.stderr_tail_bytes)
                .with_term_grace(config.term_grace()),
            prober: Prober::new(tools.ffprobe),
            output_dir: config.output_dir.clone(),
            threads: config.threads_per_job.max(1),
        }
    }

    async fn probe_inputs(
        &self,
        request: &OperationRequest,
    ) -> Result<(Option<MediaFileInfo>, Vec<MediaFileInfo>)> {
        let media = if request.operation.needs_probe() {
            Some(self.prober.probe(request.input()).await?)
        } else {
            None
        };

        let sources = if request.operation.needs_source_probes() {
            let mut infos = Vec::with_capacity(request.inputs.len());
            for input in &request.inputs {
                infos.push(self.prober.probe(input).await?);
            }
            infos
        } else {
            Vec::new()
        };

        Ok((media, sources))
    }

    async fn run_command(
        &self,
        command: &PlannedCommand,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        if let Some(ScratchFile { path, contents }) = &command.scratch {
            tokio::fs::write(path, contents).await?;
        }

        let result = self.executor.execute(command, cancel).await;

        if let Some(ScratchFile { path, .. }) = &command.scratch {
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::debug!("failed to remove scratch file {}: {e}", path.display());
            }
        }

        result
    }
}

#[async_trait]
impl JobRunner for JobProcessor {
    async fn run(
        &self,
        request: &OperationRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let kind = request.operation.kind();
        tracing::info!("processing {kind} for {}", request.input().display());

        let (media, sources) = self.probe_inputs(request).await?;

        let mut ctx = BuildContext::new(&self.output_dir)
            .with_sources(&sources)
            .with_threads(self.threads);
        if let Some(ref info) = media {
            ctx = ctx.with_media(info);
        }

        let plan = plan::build(request, &ctx)?;
        let total = plan.commands.len();

        let mut outputs = Vec::new();
        let mut last = None;
        for (step, command) in plan.commands.iter().enumerate() {
            tracing::info!("{kind}: step {}/{total}", step + 1);
            let result = self.run_command(command, cancel).await?;

            if !result.succeeded() {
                // A failed step invalidates the rest of the plan; report it
                // as the job's result.
                tracing::warn!(
                    "{kind}: step {}/{total} ended with {:?}",
                    step + 1,
                    result.outcome
                );
                return Ok(result);
            }

            outputs.extend(result.outputs.iter().cloned());
            last = Some(result);
        }

        let Some(mut result) = last else {
            return Err(Error::invalid_parameters("operation produced no commands"));
        };
        result.outputs = outputs;
        tracing::info!("{kind}: completed with {} artifact(s)", result.outputs.len());
        Ok(result)
    }
}
