use crate::{
    error::EmbernetError,
    req::HttpRequest,
    res::{response_cookie::CookieOptions, HttpResponse},
    session::{
        driver::{FileSessionDriver, SessionDriver},
        storage::SessionJob,
        Session,
    },
};
use lru::LruCache;
use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

/// The cookie carrying the session identity.
pub const SESSION_COOKIE_NAME: &str = "CNET_SID";

const SESSION_ID_LEN: usize = 20;
const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Initialization-time session configuration, installed on the server
/// config.
///
/// ## Example
///
/// ```
/// use embernet::session::manager::SessionConfig;
///
/// let config = SessionConfig {
///     directory: std::env::temp_dir().join("my-app-sessions"),
///     ..Default::default()
/// };
/// ```
pub struct SessionConfig {
    /// The persistence driver. `None` selects the default file driver over
    /// [`directory`](SessionConfig::directory).
    pub driver: Option<Arc<dyn SessionDriver>>,

    /// Directory for the default file driver.
    pub directory: PathBuf,

    /// File extension for the default file driver.
    pub file_extension: String,

    /// The reference cookie template; attributes are copied verbatim onto
    /// every session cookie.
    pub cookie: CookieOptions,

    /// Bound of the session cache.
    pub cache_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            driver: None,
            directory: std::env::temp_dir().join("embernet-sessions"),
            file_extension: "session".to_string(),
            cookie: CookieOptions::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Owns session identity and lifecycle: cookie extraction, id generation,
/// the bounded session cache and the response cookie writeback.
pub struct SessionManager {
    driver: Arc<dyn SessionDriver>,
    cache: Mutex<LruCache<String, Arc<Session>>>,
    template: CookieOptions,
}

impl SessionManager {
    /// Builds the manager from its configuration, constructing the default
    /// file driver when none is supplied.
    pub fn new(config: SessionConfig) -> Self {
        let driver = match config.driver {
            Some(driver) => driver,
            None => Arc::new(FileSessionDriver::new(
                config.directory,
                config.file_extension,
            )),
        };
        let capacity = NonZeroUsize::new(config.cache_capacity)
            .or(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            driver,
            cache: Mutex::new(LruCache::new(capacity)),
            template: config.cookie,
        }
    }

    /// The reference cookie template.
    pub fn cookie_template(&self) -> &CookieOptions {
        &self.template
    }

    /// Binds a session for an exchange.
    ///
    /// Without a session cookie the session stays transient and unlinked
    /// from the cache. With one, the id is held tentatively while the
    /// driver is asked whether it knows the record; unknown ids revert to a
    /// clean transient session, known ids join the cache (reusing the
    /// cached session object if another exchange already holds it) and the
    /// record is loaded through the queue.
    pub(crate) async fn bind(&self, request: &HttpRequest) -> Arc<Session> {
        let session = Session::new(Arc::clone(&self.driver));
        session.mark_bound_transient();

        let Ok(candidate) = request.get_cookie(SESSION_COOKIE_NAME) else {
            return session;
        };
        let candidate = candidate.to_string();

        session.mark_tentative_persistent(&candidate);
        if !session.storage().exists(&candidate).await {
            session.demote_to_transient();
            return session;
        }

        let session = {
            let mut cache = self.cache.lock();
            match cache.get(&candidate) {
                Some(cached) => Arc::clone(cached),
                None => {
                    cache.put(candidate.clone(), Arc::clone(&session));
                    session
                }
            }
        };
        session
            .storage()
            .perform(&session, SessionJob::Load)
            .await;
        session
    }

    /// Promotes a session to persistent.
    ///
    /// Requires the exchange to still own unsent headers. No-op if the
    /// session is already persistent or destroyed. Generates a fresh id,
    /// inserts the session into the cache and schedules the session cookie
    /// on the response; the first `Save` happens later through the queue,
    /// never synchronously here.
    pub fn make_persistent(
        &self,
        session: &Arc<Session>,
        response: &mut HttpResponse,
    ) -> Result<(), EmbernetError> {
        if response.headers_sent() {
            return Err(EmbernetError::headers_already_sent("make_persistent"));
        }
        if session.is_persistent() || session.state() == crate::session::SessionState::Destroyed {
            return Ok(());
        }

        let id = generate_session_id();
        session.promote_persistent(&id);
        self.cache.lock().put(id.clone(), Arc::clone(session));
        response.try_set_cookie(SESSION_COOKIE_NAME, &id, self.template.clone())?;
        Ok(())
    }

    /// Destroys a session's persistent record.
    ///
    /// Requires unsent headers. No-op if the session is not persistent.
    /// Removes the session from the cache, destroys the record through the
    /// queue, schedules the deletion-marker cookie and clears the session's
    /// identity.
    pub async fn destroy_persistent(
        &self,
        session: &Arc<Session>,
        response: &mut HttpResponse,
    ) -> Result<(), EmbernetError> {
        if response.headers_sent() {
            return Err(EmbernetError::headers_already_sent("destroy_persistent"));
        }
        if !session.is_persistent() {
            return Ok(());
        }

        if let Some(id) = session.id() {
            self.cache.lock().pop(&id);
        }
        session
            .storage()
            .perform(session, SessionJob::Destroy)
            .await;
        response.try_remove_cookie(SESSION_COOKIE_NAME, self.template.clone())?;
        session.mark_destroyed();
        Ok(())
    }

    /// The cached session for `id`, if any. Eviction is write-through only;
    /// a session falling out of the cache keeps its driver record.
    pub fn cached(&self, id: &str) -> Option<Arc<Session>> {
        self.cache.lock().get(id).map(Arc::clone)
    }
}

/// Generates a session id: 20 printable URL-safe characters from the
/// operating system's cryptographically secure source.
fn generate_session_id() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}
