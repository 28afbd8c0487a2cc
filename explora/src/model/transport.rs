// src/model/transport.rs
//
// Transports that fetch serialized model bytes. A transport reports a
// refresh count with each pull; zero means "unchanged since last time"
// and the refresh loop skips the model update entirely.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::hashing::stable_hash64;
use crate::status::{ApiError, ApiResult};

/// One model pull.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelData {
    pub data: Vec<u8>,
    /// 0 when the payload is unchanged since the previous pull;
    /// otherwise a monotonically increasing count.
    pub refresh_count: u64,
}

pub trait ModelTransport: Send + Sync {
    fn get_data(&self) -> ApiResult<ModelData>;
}

/// Transport that never yields a model. Decisions run explore-only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModelTransport;

impl ModelTransport for NoModelTransport {
    fn get_data(&self) -> ApiResult<ModelData> {
        Ok(ModelData::default())
    }
}

/// Re-reads a model file and bumps the refresh count when its content
/// changes.
#[derive(Debug)]
pub struct FileModelTransport {
    path: PathBuf,
    state: Mutex<FileTransportState>,
}

#[derive(Debug, Default)]
struct FileTransportState {
    last_content_hash: Option<u64>,
    refresh_count: u64,
}

impl FileModelTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(FileTransportState::default()),
        }
    }
}

impl ModelTransport for FileModelTransport {
    fn get_data(&self) -> ApiResult<ModelData> {
        let data = fs::read(&self.path).map_err(|e| {
            ApiError::model_update(format!(
                "failed to read model file {}: {e}",
                self.path.display()
            ))
        })?;
        let content_hash = stable_hash64(0, &String::from_utf8_lossy(&data));
        let mut state = self.state.lock().expect("file transport state poisoned");
        if state.last_content_hash == Some(content_hash) {
            return Ok(ModelData {
                data,
                refresh_count: 0,
            });
        }
        state.last_content_hash = Some(content_hash);
        state.refresh_count += 1;
        Ok(ModelData {
            data,
            refresh_count: state.refresh_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn no_model_transport_never_refreshes() {
        let t = NoModelTransport;
        assert_eq!(t.get_data().unwrap().refresh_count, 0);
        assert!(t.get_data().unwrap().data.is_empty());
    }

    #[test]
    fn file_transport_reports_changes_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"model_id":"v1","weights":{{}}}}"#).unwrap();
        file.flush().unwrap();

        let t = FileModelTransport::new(file.path());
        assert_eq!(t.get_data().unwrap().refresh_count, 1);
        // Unchanged content: refresh count drops to zero.
        assert_eq!(t.get_data().unwrap().refresh_count, 0);

        writeln!(file, r#"{{"more":true}}"#).unwrap();
        file.flush().unwrap();
        assert_eq!(t.get_data().unwrap().refresh_count, 2);
    }

    #[test]
    fn missing_file_is_a_model_update_error() {
        let t = FileModelTransport::new("/nonexistent/model.bin");
        let err = t.get_data().unwrap_err();
        assert_eq!(err.code, crate::status::ErrorCode::ModelUpdateError);
    }
}
