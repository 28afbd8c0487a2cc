// src/model/refresh.rs
//
// Background model refresh: pull model bytes on a fixed cadence and
// swap them into the inference model. Runs as a tokio task owned by the
// live model and exits cooperatively on the shutdown signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::model::adapter::InferenceModel;
use crate::model::transport::ModelTransport;
use crate::status::{ApiResult, ErrorReporter};
use crate::trace::TraceLogger;

/// One refresh pass: pull, skip when unchanged, otherwise update.
///
/// Returns whether the model was updated.
pub(crate) fn refresh_once(
    transport: &dyn ModelTransport,
    model: &dyn InferenceModel,
    model_ready: &AtomicBool,
) -> ApiResult<bool> {
    let data = transport.get_data()?;
    if data.refresh_count == 0 {
        return Ok(false);
    }
    let ready = model.update(&data)?;
    model_ready.store(ready, Ordering::SeqCst);
    Ok(true)
}

/// Spawn the periodic refresh loop. Errors are delivered to the
/// reporter; the loop itself never dies before shutdown.
#[allow(clippy::too_many_arguments)]
pub fn spawn_refresh_loop(
    handle: &tokio::runtime::Handle,
    transport: Arc<dyn ModelTransport>,
    model: Arc<dyn InferenceModel>,
    interval_ms: i64,
    model_ready: Arc<AtomicBool>,
    reporter: ErrorReporter,
    trace: Arc<dyn TraceLogger>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    handle.spawn(async move {
        let period = Duration::from_millis(interval_ms.max(1) as u64);
        let mut ticks = tokio::time::interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    match refresh_once(&*transport, &*model, &model_ready) {
                        Ok(true) => trace.info("model refreshed from transport"),
                        Ok(false) => {
                            trace.info("model not updated since previous download");
                        }
                        Err(e) => {
                            trace.warn(&format!("model refresh failed: {e}"));
                            reporter.report(&e);
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::adapter::ExploreAdfModel;
    use crate::model::transport::{ModelData, NoModelTransport};
    use crate::model::ModelKind;
    use crate::status::{ApiError, ErrorReporter};
    use crate::trace::NullTrace;
    use crate::watchdog::Watchdog;
    use std::sync::Mutex;

    struct ScriptedTransport {
        pulls: Mutex<Vec<ApiResult<ModelData>>>,
    }

    impl ModelTransport for ScriptedTransport {
        fn get_data(&self) -> ApiResult<ModelData> {
            let mut pulls = self.pulls.lock().unwrap();
            if pulls.is_empty() {
                Ok(ModelData::default())
            } else {
                pulls.remove(0)
            }
        }
    }

    #[test]
    fn refresh_once_skips_unchanged_payloads() {
        let model = ExploreAdfModel::new(ModelKind::Cb, 0.2, (0.0, 1.0));
        let ready = AtomicBool::new(false);
        let updated = refresh_once(&NoModelTransport, &model, &ready).unwrap();
        assert!(!updated);
        assert!(!ready.load(Ordering::SeqCst));
        assert!(!model.is_loaded());
    }

    #[test]
    fn refresh_once_applies_changed_payloads() {
        let blob = serde_json::json!({"model_id": "m-1", "weights": {}});
        let transport = ScriptedTransport {
            pulls: Mutex::new(vec![Ok(ModelData {
                data: serde_json::to_vec(&blob).unwrap(),
                refresh_count: 1,
            })]),
        };
        let model = ExploreAdfModel::new(ModelKind::Cb, 0.2, (0.0, 1.0));
        let ready = AtomicBool::new(false);
        assert!(refresh_once(&transport, &model, &ready).unwrap());
        assert!(ready.load(Ordering::SeqCst));
        assert!(model.is_loaded());
    }

    #[tokio::test]
    async fn loop_reports_errors_and_keeps_running() {
        let transport = Arc::new(ScriptedTransport {
            pulls: Mutex::new(vec![Err(ApiError::model_update("blob store down"))]),
        });
        let model = Arc::new(ExploreAdfModel::new(ModelKind::Cb, 0.2, (0.0, 1.0)));
        let watchdog = Arc::new(Watchdog::new());
        let reporter = ErrorReporter::new(watchdog.clone(), None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::runtime::Handle::current();
        let task = spawn_refresh_loop(
            &handle,
            transport,
            model,
            5,
            Arc::new(AtomicBool::new(false)),
            reporter,
            Arc::new(NullTrace),
            shutdown_rx,
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(watchdog.has_background_error_been_reported());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
