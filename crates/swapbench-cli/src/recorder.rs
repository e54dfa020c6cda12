use futures::{Stream, StreamExt};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use swapbench_core::{HttpClient, ImageRef, TestRecord};
use swapbench_report::{ArtifactStore, BatchSummary, CsvSink, LogRow, SinkError};

/// Persists each record as it arrives: result image first, then the log row.
pub struct Recorder<'a> {
    run_id: String,
    sink: CsvSink,
    artifacts: ArtifactStore,
    summary: BatchSummary,
    downloader: Option<&'a HttpClient>,
}

impl<'a> Recorder<'a> {
    /// `downloader` is used to fetch URL results; without one the URL
    /// itself is logged.
    pub fn open(
        log_path: &Path,
        results_dir: &Path,
        run_id: impl Into<String>,
        downloader: Option<&'a HttpClient>,
    ) -> Result<Self, SinkError> {
        Ok(Self {
            run_id: run_id.into(),
            sink: CsvSink::open(log_path)?,
            artifacts: ArtifactStore::new(results_dir),
            summary: BatchSummary::new(),
            downloader,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn summary(&self) -> &BatchSummary {
        &self.summary
    }

    /// Only a log write failure is an error; artifact problems are logged
    /// and the row is written without an image reference.
    pub async fn record(&mut self, record: &TestRecord) -> Result<(), SinkError> {
        self.summary.add(record);

        let result_image = match &record.result.image {
            Some(ImageRef::Bytes(bytes)) => self.save(record, bytes),
            Some(ImageRef::Url(url)) => match self.downloader {
                Some(client) => match client.fetch_image(url).await {
                    Ok(bytes) => self.save(record, &bytes).or_else(|| Some(url.clone())),
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "failed to download result image");
                        Some(url.clone())
                    }
                },
                None => Some(url.clone()),
            },
            None => None,
        };

        self.sink
            .append(&LogRow::from_record(record, &self.run_id, result_image))
    }

    /// Record every item of `stream`, printing a progress line per attempt.
    ///
    /// `stop` is checked between records only, so a record that is already
    /// in flight is always written before returning. Returns the number of
    /// combinations started.
    pub async fn record_stream<S>(&mut self, stream: S, total: usize, stop: &AtomicBool) -> Result<usize, SinkError>
    where
        S: Stream<Item = TestRecord>,
    {
        futures::pin_mut!(stream);
        let mut done = 0;
        while let Some(record) = stream.next().await {
            if record.attempt <= 1 {
                done += 1;
            }
            let status = if record.result.success {
                "ok".to_string()
            } else {
                record.result.error_message.clone().unwrap_or_default()
            };
            println!(
                "[{done}/{total}] {} -> {} {} (attempt {}, {:.1}s): {status}",
                record.source_id,
                record.target_id,
                record.provider,
                record.attempt,
                record.result.wall_clock_millis as f64 / 1000.0,
            );
            self.record(&record).await?;

            if stop.load(Ordering::SeqCst) {
                break;
            }
        }
        Ok(done)
    }

    fn save(&self, record: &TestRecord, bytes: &[u8]) -> Option<String> {
        match self.artifacts.save(record, &self.run_id, bytes) {
            Ok(saved) => Some(saved.file_name()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to save result image");
                None
            }
        }
    }
}
