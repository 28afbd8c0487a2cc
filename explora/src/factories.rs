// src/factories.rs
//
// Name → constructor registries for the pluggable seams: byte senders,
// model transports, models, trace loggers, time providers. Populated
// with the built-ins at startup; hosts may register additional
// implementations before building a live model, after which the
// registries are only read.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{defaults, keys, values, Configuration};
use crate::logger::sender::{FileSender, HttpApiSender, Sender};
use crate::model::adapter::{ExploreAdfModel, InferenceModel};
use crate::model::transport::{FileModelTransport, ModelTransport, NoModelTransport};
use crate::model::{command_line_float, ModelKind};
use crate::status::{ApiError, ApiResult, ErrorReporter};
use crate::time::{SystemTimeProvider, TimeProvider};
use crate::trace::{NullTrace, StderrTrace, TraceLogger};

/// Runtime context handed to sender constructors.
#[derive(Clone)]
pub struct SenderContext {
    pub runtime: tokio::runtime::Handle,
    pub reporter: ErrorReporter,
    pub trace: Arc<dyn TraceLogger>,
}

pub type SenderFactoryFn = fn(&Configuration, &SenderContext) -> ApiResult<Box<dyn Sender>>;
pub type TransportFactoryFn = fn(&Configuration) -> ApiResult<Arc<dyn ModelTransport>>;
pub type ModelFactoryFn = fn(&Configuration) -> ApiResult<Arc<dyn InferenceModel>>;
pub type TraceFactoryFn = fn(&Configuration) -> ApiResult<Arc<dyn TraceLogger>>;
pub type TimeFactoryFn = fn(&Configuration) -> ApiResult<Arc<dyn TimeProvider>>;

pub struct FactoryRegistries {
    senders: BTreeMap<String, SenderFactoryFn>,
    transports: BTreeMap<String, TransportFactoryFn>,
    models: BTreeMap<String, ModelFactoryFn>,
    traces: BTreeMap<String, TraceFactoryFn>,
    time_providers: BTreeMap<String, TimeFactoryFn>,
}

impl Default for FactoryRegistries {
    fn default() -> Self {
        let mut registries = Self {
            senders: BTreeMap::new(),
            transports: BTreeMap::new(),
            models: BTreeMap::new(),
            traces: BTreeMap::new(),
            time_providers: BTreeMap::new(),
        };
        registries.register_sender(values::FILE_SENDER, file_sender_create);
        registries.register_sender(values::HTTP_API_SENDER, http_api_sender_create);
        registries.register_transport(values::NO_MODEL_DATA, no_model_transport_create);
        registries.register_transport(values::FILE_MODEL_DATA, file_model_transport_create);
        registries.register_model(values::EXPLORE_ADF_MODEL, explore_adf_model_create);
        registries.register_trace(values::NULL_TRACE, |_| Ok(Arc::new(NullTrace)));
        registries.register_trace(values::STDERR_TRACE, |_| Ok(Arc::new(StderrTrace)));
        registries.register_time_provider(values::CLOCK_TIME_PROVIDER, |_| {
            Ok(Arc::new(SystemTimeProvider))
        });
        registries
    }
}

impl FactoryRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_sender(&mut self, name: impl Into<String>, factory: SenderFactoryFn) {
        self.senders.insert(name.into(), factory);
    }

    pub fn register_transport(&mut self, name: impl Into<String>, factory: TransportFactoryFn) {
        self.transports.insert(name.into(), factory);
    }

    pub fn register_model(&mut self, name: impl Into<String>, factory: ModelFactoryFn) {
        self.models.insert(name.into(), factory);
    }

    pub fn register_trace(&mut self, name: impl Into<String>, factory: TraceFactoryFn) {
        self.traces.insert(name.into(), factory);
    }

    pub fn register_time_provider(&mut self, name: impl Into<String>, factory: TimeFactoryFn) {
        self.time_providers.insert(name.into(), factory);
    }

    pub fn create_sender(
        &self,
        name: &str,
        config: &Configuration,
        context: &SenderContext,
    ) -> ApiResult<Box<dyn Sender>> {
        let factory = self.senders.get(name).ok_or_else(|| {
            ApiError::invalid_argument(format!("unknown sender implementation {name}"))
        })?;
        factory(config, context)
    }

    pub fn create_transport(
        &self,
        name: &str,
        config: &Configuration,
    ) -> ApiResult<Arc<dyn ModelTransport>> {
        let factory = self.transports.get(name).ok_or_else(|| {
            ApiError::invalid_argument(format!("unknown model transport {name}"))
        })?;
        factory(config)
    }

    pub fn create_model(
        &self,
        name: &str,
        config: &Configuration,
    ) -> ApiResult<Arc<dyn InferenceModel>> {
        let factory = self.models.get(name).ok_or_else(|| {
            ApiError::invalid_argument(format!("unknown model implementation {name}"))
        })?;
        factory(config)
    }

    pub fn create_trace(
        &self,
        name: &str,
        config: &Configuration,
    ) -> ApiResult<Arc<dyn TraceLogger>> {
        let factory = self.traces.get(name).ok_or_else(|| {
            ApiError::invalid_argument(format!("unknown trace implementation {name}"))
        })?;
        factory(config)
    }

    pub fn create_time_provider(
        &self,
        name: &str,
        config: &Configuration,
    ) -> ApiResult<Arc<dyn TimeProvider>> {
        let factory = self.time_providers.get(name).ok_or_else(|| {
            ApiError::invalid_argument(format!("unknown time provider {name}"))
        })?;
        factory(config)
    }
}

fn file_sender_create(
    config: &Configuration,
    _context: &SenderContext,
) -> ApiResult<Box<dyn Sender>> {
    let default_name = config
        .section()
        .map(|s| format!("{s}.events.data"))
        .unwrap_or_else(|| "events.data".to_string());
    let path = config.get_or(keys::FILE_NAME, &default_name).to_string();
    Ok(Box::new(FileSender::new(path)))
}

fn http_api_sender_create(
    config: &Configuration,
    context: &SenderContext,
) -> ApiResult<Box<dyn Sender>> {
    let host = config.get(keys::EH_HOST).ok_or_else(|| {
        ApiError::http_uri_not_provided(format!(
            "{}.{} is required for the http sender",
            config.section().unwrap_or("<channel>"),
            keys::EH_HOST
        ))
    })?;
    let url = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        let name = config
            .get(keys::EH_NAME)
            .or(config.section())
            .unwrap_or("events");
        format!("https://{host}/{name}/messages")
    };
    // Event-hub style keys take precedence; API-management style keys
    // are honored as the fallback spelling.
    let tasks_limit = config.get_int(
        keys::EH_TASKS_LIMIT,
        config.get_int(keys::APIM_TASKS_LIMIT, defaults::EH_TASKS_LIMIT),
    );
    let max_retries = config.get_int(
        keys::EH_MAX_HTTP_RETRIES,
        config.get_int(keys::APIM_MAX_HTTP_RETRIES, defaults::EH_MAX_HTTP_RETRIES),
    );
    Ok(Box::new(HttpApiSender::new(
        url,
        context.runtime.clone(),
        tasks_limit.max(1) as usize,
        max_retries.max(1) as u32,
        context.reporter.clone(),
        context.trace.clone(),
    )))
}

fn no_model_transport_create(_config: &Configuration) -> ApiResult<Arc<dyn ModelTransport>> {
    Ok(Arc::new(NoModelTransport))
}

fn file_model_transport_create(config: &Configuration) -> ApiResult<Arc<dyn ModelTransport>> {
    let path = config.get(keys::MODEL_FILE_NAME).ok_or_else(|| {
        ApiError::invalid_argument(format!(
            "{} is required for the file model transport",
            keys::MODEL_FILE_NAME
        ))
    })?;
    Ok(Arc::new(FileModelTransport::new(path)))
}

fn explore_adf_model_create(config: &Configuration) -> ApiResult<Arc<dyn InferenceModel>> {
    let command_line = config.get_or(keys::MODEL_COMMAND_LINE, "");
    let kind = ModelKind::from_command_line(command_line);
    let epsilon = config.get_float(keys::INITIAL_EPSILON, defaults::INITIAL_EPSILON);
    let lo = command_line_float(command_line, "--min_value").unwrap_or(0.0);
    let hi = command_line_float(command_line, "--max_value").unwrap_or(1.0);
    Ok(Arc::new(ExploreAdfModel::new(kind, epsilon, (lo, hi))))
}
