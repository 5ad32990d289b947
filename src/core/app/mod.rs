//! Process-wide collaborators, built once at startup and lent to every
//! chat session.

pub mod settings;

use std::sync::Arc;

use tracing::warn;

use crate::core::adapters::{build_adapter, ProviderAdapter};
use crate::core::builtin_providers::{load_builtin_providers, ProviderConfig};
use crate::core::persistence::{RecordSink, Recorder, SqliteStore};
use crate::core::providers::{Credentials, ProviderSession};
use crate::core::transport::{HttpTransport, Transport, TransportError};
use crate::utils::logging::TranscriptLog;

pub use settings::{CliOverrides, Settings};

pub struct AppContext {
    pub providers: Vec<ProviderConfig>,
    pub settings: Settings,
    pub credentials: Credentials,
    pub transport: Arc<dyn Transport>,
    store: Option<Arc<SqliteStore>>,
}

impl AppContext {
    pub fn new(
        providers: Vec<ProviderConfig>,
        settings: Settings,
        credentials: Credentials,
        transport: Arc<dyn Transport>,
        store: Option<Arc<SqliteStore>>,
    ) -> Self {
        Self {
            providers,
            settings,
            credentials,
            transport,
            store,
        }
    }

    /// Production wiring: built-in providers, keys from the environment, the
    /// reqwest transport and, when enabled, the SQLite store.
    ///
    /// A store that fails to open is reported and skipped; chatting still
    /// works with the JSONL log alone.
    pub fn from_settings(settings: Settings) -> Result<Self, TransportError> {
        let providers = load_builtin_providers();
        let credentials = Credentials::from_env(&providers);
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(settings.insecure_tls)?);

        let store = if settings.use_sqlite {
            match SqliteStore::open(&settings.sqlite_path) {
                Ok(store) => Some(Arc::new(store)),
                Err(err) => {
                    warn!(
                        path = %settings.sqlite_path.display(),
                        error = %err,
                        "SQLite store unavailable"
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(providers, settings, credentials, transport, store))
    }

    pub fn recorder_for(&self, provider_id: &str) -> Recorder {
        let mut sinks: Vec<Arc<dyn RecordSink>> = vec![Arc::new(TranscriptLog::new(
            &self.settings.log_dir,
            provider_id,
        ))];
        if let Some(store) = &self.store {
            sinks.push(store.clone());
        }
        Recorder::new(provider_id, sinks)
    }

    pub fn adapter_for(&self, session: ProviderSession) -> Box<dyn ProviderAdapter> {
        let request = self.settings.request_settings_for(&session.config.id);
        build_adapter(session, &request)
    }
}
