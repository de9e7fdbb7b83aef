//! Batch upload of imported draws.

use futures::future::join_all;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::config::DEFAULT_UPLOAD_BATCH_SIZE;
use crate::import::parse_file_content;
use crate::types::{NewDraw, UploadBatchItem};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadFailure {
    pub draw_number: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadProgress {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<UploadFailure>,
}

impl UploadProgress {
    fn absorb(&mut self, other: &UploadProgress) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.failures.extend(other.failures.iter().cloned());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<UploadProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadReport {
    pub files: Vec<FileOutcome>,
    pub totals: UploadProgress,
}

impl UploadReport {
    pub fn failed_files(&self) -> usize {
        self.files.iter().filter(|f| f.error.is_some()).count()
    }

    pub fn summary(&self) -> String {
        let failed_files = self.failed_files();
        let totals = &self.totals;

        if totals.failed == 0 && failed_files == 0 {
            return format!(
                "Successfully uploaded {} draw(s) from {} file(s)",
                totals.succeeded,
                self.files.len()
            );
        }

        let mut message = format!("Uploaded {} of {} draw(s)", totals.succeeded, totals.processed);
        if totals.failed > 0 {
            message.push_str(&format!(", {} failed", totals.failed));
        }
        if failed_files > 0 {
            message.push_str(&format!(", {} file(s) could not be imported", failed_files));
        }
        message
    }
}

pub struct BatchUploader {
    client: Arc<ApiClient>,
    batch_size: usize,
}

impl BatchUploader {
    pub fn new(client: Arc<ApiClient>, batch_size: usize) -> Self {
        let batch_size = if batch_size == 0 { DEFAULT_UPLOAD_BATCH_SIZE } else { batch_size };
        Self { client, batch_size }
    }

    /// Batches go out one after another; requests inside a batch run
    /// concurrently and a failed item never cancels its siblings.
    pub async fn upload_items(&self, items: &[UploadBatchItem]) -> UploadProgress {
        let mut progress = UploadProgress::default();

        for (index, batch) in items.chunks(self.batch_size).enumerate() {
            let results = join_all(batch.iter().map(|item| async move {
                let draw = NewDraw::from(item);
                (item.draw_number, self.client.create_draw(draw).await)
            }))
            .await;

            for (draw_number, result) in results {
                progress.processed += 1;
                match result {
                    Ok(_) => progress.succeeded += 1,
                    Err(e) => {
                        warn!(draw_number, error = %e, "draw upload failed");
                        progress.failed += 1;
                        progress.failures.push(UploadFailure {
                            draw_number,
                            message: e.to_string(),
                        });
                    }
                }
            }
            info!(
                batch = index + 1,
                processed = progress.processed,
                total = items.len(),
                "batch uploaded"
            );
        }

        progress
    }

    /// Reads, parses and uploads each file in turn. A file that cannot be
    /// read or parsed is reported and skipped.
    pub async fn upload_files<P: AsRef<Path>>(&self, paths: &[P]) -> UploadReport {
        let mut report = UploadReport::default();

        for path in paths {
            let path = path.as_ref();
            let file = path.display().to_string();
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file.clone());

            let parsed = match tokio::fs::read_to_string(path).await {
                Ok(text) => parse_file_content(&text, &file_name).map_err(|e| e.to_string()),
                Err(e) => Err(format!("Could not read file: {}", e)),
            };

            match parsed {
                Ok(items) => {
                    info!(file = %file, rows = items.len(), "uploading file");
                    let progress = self.upload_items(&items).await;
                    report.totals.absorb(&progress);
                    report.files.push(FileOutcome {
                        file,
                        progress: Some(progress),
                        error: None,
                    });
                }
                Err(message) => {
                    warn!(file = %file, error = %message, "skipping file");
                    report.files.push(FileOutcome {
                        file,
                        progress: None,
                        error: Some(message),
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubEvent, StubServer, admin_session, test_client};
    use serde_json::{Value, json};
    use std::fs;
    use std::time::Duration;

    fn item(draw_number: u32, white_balls: [u8; 5]) -> UploadBatchItem {
        UploadBatchItem {
            draw_number,
            draw_date: "2024-01-01".to_string(),
            white_balls,
            powerball: 6,
            jackpot_amount: None,
            winners: None,
        }
    }

    /// Rejects draw number 1002 the way the backend rejects a duplicate.
    async fn draws_server() -> StubServer {
        StubServer::spawn(|req| {
            let body: Value = serde_json::from_str(&req.body).unwrap_or_default();
            if body["draw_number"] == 1002 {
                (400, json!({ "detail": "Draw 1002 already exists" }).to_string())
            } else {
                (200, json!({ "success": true, "draw": body }).to_string())
            }
        })
        .await
    }

    fn admin_uploader(server: &StubServer, batch_size: usize) -> BatchUploader {
        BatchUploader::new(Arc::new(test_client(server, Some(admin_session()))), batch_size)
    }

    #[tokio::test]
    async fn test_partial_failures_are_counted() {
        let server = draws_server().await;
        let uploader = admin_uploader(&server, 2);

        let items = vec![
            item(1001, [5, 4, 3, 2, 1]),
            item(1002, [1, 2, 3, 4, 5]),
            item(1003, [10, 20, 30, 40, 50]),
        ];
        let progress = uploader.upload_items(&items).await;

        assert_eq!(progress.processed, 3);
        assert_eq!(progress.succeeded, 2);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.failures[0].draw_number, 1002);
        assert!(progress.failures[0].message.contains("already exists"));

        let sent: Vec<Value> = server
            .requests()
            .iter()
            .map(|r| serde_json::from_str(&r.body).unwrap())
            .collect();
        assert_eq!(sent.len(), 3);
        let first = sent.iter().find(|b| b["draw_number"] == 1001).unwrap();
        assert_eq!(first["white_balls"], json!([1, 2, 3, 4, 5]));
    }

    #[tokio::test]
    async fn test_next_batch_waits_for_previous_responses() {
        let server = StubServer::spawn_with_delay(Duration::from_millis(150), |req| {
            let body: Value = serde_json::from_str(&req.body).unwrap_or_default();
            (200, json!({ "success": true, "draw": body }).to_string())
        })
        .await;
        let uploader = admin_uploader(&server, 2);

        let items = vec![
            item(1, [1, 2, 3, 4, 5]),
            item(2, [6, 7, 8, 9, 10]),
            item(3, [11, 12, 13, 14, 15]),
            item(4, [16, 17, 18, 19, 20]),
        ];
        let progress = uploader.upload_items(&items).await;
        assert_eq!(progress.succeeded, 4);
        assert_eq!(server.max_in_flight(), 2);

        let draw_numbers: Vec<u64> = server
            .requests()
            .iter()
            .map(|r| {
                let body: Value = serde_json::from_str(&r.body).unwrap();
                body["draw_number"].as_u64().unwrap()
            })
            .collect();
        let events = server.events();
        let position = |wanted: StubEvent| events.iter().position(|e| *e == wanted).unwrap();
        let index_of = |draw: u64| draw_numbers.iter().position(|d| *d == draw).unwrap();

        let last_first_batch_response = [1, 2]
            .iter()
            .map(|d| position(StubEvent::Responded(index_of(*d))))
            .max()
            .unwrap();
        let first_second_batch_arrival = [3, 4]
            .iter()
            .map(|d| position(StubEvent::Arrived(index_of(*d))))
            .min()
            .unwrap();
        assert!(last_first_batch_response < first_second_batch_arrival);
    }

    #[tokio::test]
    async fn test_invalid_item_fails_without_request() {
        let server = draws_server().await;
        let uploader = admin_uploader(&server, 50);

        let progress = uploader.upload_items(&[item(1004, [7, 7, 8, 9, 10])]).await;
        assert_eq!(progress.failed, 1);
        assert!(progress.failures[0].message.contains("unique"));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn test_bad_file_does_not_stop_others() {
        let server = draws_server().await;
        let uploader = admin_uploader(&server, 50);

        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.csv");
        let good = dir.path().join("good.txt");
        let missing = dir.path().join("missing.csv");
        fs::write(&bad, "1001,2024-01-01,1,2,3\n").unwrap();
        fs::write(
            &good,
            "Draw Date WB PB\n2001 1/6/2024 8 19 27 33 51 4\n2002 1/8/2024 2 11 12 44 60 21\n",
        )
        .unwrap();

        let report = uploader.upload_files(&[bad, good, missing]).await;

        assert_eq!(report.files.len(), 3);
        assert!(report.files[0].error.as_deref().unwrap().starts_with("Line 1:"));
        assert_eq!(report.files[1].progress.as_ref().unwrap().succeeded, 2);
        assert!(report.files[2].error.as_deref().unwrap().starts_with("Could not read file"));
        assert_eq!(report.totals.succeeded, 2);
        assert_eq!(report.failed_files(), 2);
        assert_eq!(report.summary(), "Uploaded 2 of 2 draw(s), 2 file(s) could not be imported");
    }

    #[test]
    fn test_summary_messages() {
        let clean = UploadReport {
            files: vec![FileOutcome {
                file: "a.csv".to_string(),
                progress: None,
                error: None,
            }],
            totals: UploadProgress {
                processed: 4,
                succeeded: 4,
                ..UploadProgress::default()
            },
        };
        assert_eq!(clean.summary(), "Successfully uploaded 4 draw(s) from 1 file(s)");

        let partial = UploadReport {
            files: Vec::new(),
            totals: UploadProgress {
                processed: 5,
                succeeded: 3,
                failed: 2,
                failures: Vec::new(),
            },
        };
        assert_eq!(partial.summary(), "Uploaded 3 of 5 draw(s), 2 failed");
    }
}
