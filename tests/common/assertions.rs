//! Assertions over run statuses and exported CSV files

use auction_export::{Orchestrator, Stage, TaskStatus};
use std::path::Path;

/// Latest status of a run, failing the test when there is none
pub async fn final_status(orchestrator: &Orchestrator, run_id: &str) -> TaskStatus {
    orchestrator
        .status(run_id)
        .await
        .expect("status store readable")
        .unwrap_or_else(|| panic!("no status published for {run_id}"))
}

/// Assert the run ended in `stage`, printing its message otherwise
pub async fn assert_stage(orchestrator: &Orchestrator, run_id: &str, stage: Stage) -> TaskStatus {
    let status = final_status(orchestrator, run_id).await;
    assert_eq!(status.stage, stage, "run {run_id}: {}", status.message);
    status
}

/// Parsed export: header plus rows
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn read(path: &Path) -> Self {
        let text = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("export {} unreadable: {e}", path.display()));
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Self {
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let headers = reader.headers().unwrap().iter().map(String::from).collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        Self { headers, rows }
    }

    pub fn column(&self, name: &str) -> Vec<&str> {
        let idx = self
            .headers
            .iter()
            .position(|h| h == name)
            .unwrap_or_else(|| panic!("no column {name}"));
        self.rows.iter().map(|r| r[idx].as_str()).collect()
    }

    /// Row whose `LotNumber` is `lot`
    pub fn row(&self, lot: &str) -> Vec<(&str, &str)> {
        let lot_idx = self.headers.iter().position(|h| h == "LotNumber").unwrap();
        let row = self
            .rows
            .iter()
            .find(|r| r[lot_idx] == lot)
            .unwrap_or_else(|| panic!("no row for lot {lot}"));
        self.headers
            .iter()
            .map(String::as_str)
            .zip(row.iter().map(String::as_str))
            .collect()
    }

    pub fn cell(&self, lot: &str, column: &str) -> String {
        self.row(lot)
            .into_iter()
            .find(|(h, _)| *h == column)
            .map(|(_, v)| v.to_string())
            .unwrap_or_else(|| panic!("no column {column}"))
    }
}
