//! Report export: metrics rows -> workbook -> daily folder upload.

pub mod xlsx;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::metrics::MetricsRecord;
use crate::storage::{self, StorageError, StorageProvider};
use xlsx::{column_letter, Cell, XLSX_MIME_TYPE};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to build spreadsheet: {0}")]
    Workbook(#[from] std::io::Error),
}

/// Delivers a finished report and returns a link to it.
#[async_trait]
pub trait ReportExporter: Send + Sync {
    async fn export(
        &self,
        records: &[MetricsRecord],
        user: &str,
        task_number: u32,
    ) -> Result<String, ExportError>;
}

/// File name for a task's report.
pub fn report_file_name(task_number: u32) -> String {
    format!("Task {} Output.xlsx", task_number)
}

/// Header plus one row per record, with a trailing `CPM` formula column.
pub fn report_rows(records: &[MetricsRecord]) -> Vec<Vec<Cell>> {
    let mut header: Vec<Cell> = MetricsRecord::COLUMNS
        .iter()
        .map(|c| Cell::Text(c.to_string()))
        .collect();
    header.push(Cell::Text("CPM".to_string()));

    let price_col = column_letter(MetricsRecord::PRICE_COLUMN);
    let views_col = column_letter(MetricsRecord::AVG_VIEWS_COLUMN);

    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(header);
    for (i, record) in records.iter().enumerate() {
        let row_number = i + 2;
        let price = format!("{}{}", price_col, row_number);
        let views = format!("{}{}", views_col, row_number);
        rows.push(vec![
            Cell::Text(record.channel_name.clone()),
            Cell::Number(record.num_videos as f64),
            Cell::Number(record.total_views as f64),
            Cell::Number(record.avg_views),
            Cell::Number(record.avg_likes),
            Cell::Number(record.avg_comments),
            Cell::Number(record.comment_to_view_ratio),
            Cell::Number(record.like_to_view_ratio),
            Cell::Number(record.engagement_score),
            Cell::Number(record.standard_deviation),
            Cell::Number(record.price),
            Cell::Formula {
                formula: format!(r#"IF({p}=0,"",{p}/({v}/1000))"#, p = price, v = views),
                cached: record.cpm(),
            },
        ]);
    }
    rows
}

/// Uploads reports into `{parent}/{MM-DD-YYYY}/Task N Output.xlsx`.
pub struct SpreadsheetExporter {
    storage: Arc<dyn StorageProvider>,
    parent_folder_id: String,
}

impl SpreadsheetExporter {
    pub fn new(storage: Arc<dyn StorageProvider>, parent_folder_id: String) -> Self {
        Self {
            storage,
            parent_folder_id,
        }
    }
}

#[async_trait]
impl ReportExporter for SpreadsheetExporter {
    async fn export(
        &self,
        records: &[MetricsRecord],
        user: &str,
        task_number: u32,
    ) -> Result<String, ExportError> {
        let backend = self.storage.for_user(user).await?;

        let workbook = xlsx::write_workbook("Sheet1", &report_rows(records))?;
        let file_name = report_file_name(task_number);

        let folder_name = storage::daily_folder_name(storage::today());
        let folder_id = backend
            .find_or_create_folder(&self.parent_folder_id, &folder_name)
            .await?;
        let file_id = backend
            .upload(&folder_id, &file_name, XLSX_MIME_TYPE, Bytes::from(workbook))
            .await?;

        tracing::info!(user, file = %file_name, folder = %folder_name, "Report uploaded");
        Ok(backend.file_link(&file_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{compute, ChannelStats};
    use crate::storage::testing::MemoryStorage;
    use std::io::Read;

    const PARENT: &str = "parent-folder";

    fn record(name: &str, views: u64) -> MetricsRecord {
        compute(&ChannelStats {
            channel_name: name.to_string(),
            num_videos: 2,
            views,
            likes: 10,
            comments: 5,
            engagement_score: 1.5,
            video_views: vec![views / 2, views / 2],
        })
    }

    fn sheet_of(bytes: &[u8]) -> String {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name("xl/worksheets/sheet1.xml").unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        contents
    }

    #[test]
    fn rows_follow_record_order_with_cpm_column() {
        let rows = report_rows(&[record("First", 1000), record("Second", 4000)]);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].len(), MetricsRecord::COLUMNS.len() + 1);
        assert_eq!(rows[0].last(), Some(&Cell::Text("CPM".to_string())));
        assert_eq!(rows[1][0], Cell::Text("First".to_string()));
        assert_eq!(rows[2][0], Cell::Text("Second".to_string()));
        assert_eq!(rows[1][3], Cell::Number(500.0));
        assert_eq!(
            rows[2][11],
            Cell::Formula {
                formula: r#"IF(K3=0,"",K3/(D3/1000))"#.to_string(),
                cached: None,
            }
        );
    }

    #[test]
    fn cpm_cache_reflects_price() {
        let mut priced = record("Priced", 10_000);
        priced.price = 100.0;
        let rows = report_rows(&[priced]);
        match &rows[1][11] {
            Cell::Formula { cached, .. } => assert_eq!(*cached, Some(20.0)),
            other => panic!("expected formula, got {:?}", other),
        }
    }

    #[test]
    fn empty_report_has_only_header() {
        assert_eq!(report_rows(&[]).len(), 1);
    }

    #[tokio::test]
    async fn export_uploads_into_todays_folder() {
        let memory = MemoryStorage::with_users(&["a@example.com"]);
        let exporter = SpreadsheetExporter::new(Arc::new(memory.clone()), PARENT.to_string());

        let link = exporter
            .export(&[record("Chan", 2000)], "a@example.com", 4)
            .await
            .unwrap();
        assert!(link.starts_with("memory://"));

        let folder_name = storage::daily_folder_name(storage::today());
        let folder = memory.folder_id(PARENT, &folder_name).expect("daily folder");
        let files = memory.files_in(&folder);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "Task 4 Output.xlsx");
        assert_eq!(files[0].mime_type, XLSX_MIME_TYPE);
        assert!(link.ends_with(&files[0].id));

        let sheet = sheet_of(&files[0].data);
        assert!(sheet.contains("Chan"));
        assert!(sheet.contains("CPM"));
    }

    #[tokio::test]
    async fn export_without_credentials_fails() {
        let storage = MemoryStorage::with_users(&[]);
        let exporter = SpreadsheetExporter::new(Arc::new(storage), PARENT.to_string());

        let err = exporter
            .export(&[record("Chan", 2000)], "a@example.com", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Storage(StorageError::NotAuthenticated(_))));
    }
}
