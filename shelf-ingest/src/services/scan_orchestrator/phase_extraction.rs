//! EXTRACTING: photo to raw detections

use super::{PipelineError, ScanOrchestrator, ScanRun};

impl ScanOrchestrator {
    /// Any extraction failure fails the run; no items are processed
    pub(super) async fn phase_extraction(&self, run: &mut ScanRun) -> Result<(), PipelineError> {
        let kind = run.request.kind;
        let detected = self.extraction.detect(&run.request.image, kind).await?;

        // The target shelf decides the kind, whatever the extractor guessed
        run.detected = detected
            .into_iter()
            .map(|mut item| {
                item.kind = kind;
                item
            })
            .collect();

        tracing::info!(
            job_id = %run.job_id(),
            detected = run.detected.len(),
            "Extraction finished"
        );
        Ok(())
    }
}
