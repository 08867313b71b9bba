use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use campuscache_core::models::{Course, CourseFilter, ListPage};
use campuscache_core::queries;
use campuscache_core::realtime::{channels, LocalTransport, RealtimeBridge};
use campuscache_core::{
    ApiClient, AuthProvider, CacheKey, Config, Preferences, Query, QueryClient, QueryState,
    RefreshCoordinator, SessionAuth, StaticToken,
};
use chrono::Local;
use serde_json::Value;
use tracing::{debug, warn};

/// Everything a command needs: config, auth, API client and the cache.
struct AppContext {
    config: Config,
    api: ApiClient,
    cache: QueryClient,
    _refresh: RefreshCoordinator,
}

impl AppContext {
    fn load() -> Result<Self> {
        let mut config = Config::load().context("Failed to load config")?;
        config.apply_env();

        let cache = QueryClient::new(config.cache_config())?;

        // An explicit token wins over the stored session.
        let auth: Arc<dyn AuthProvider> = match &config.token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(open_session(&config)?),
        };

        let refresh = RefreshCoordinator::spawn(Arc::clone(&auth), cache.clone());
        let api = ApiClient::with_timeout(config.api_url(), auth, config.request_timeout())?
            .with_unauthorized_notifier(refresh.notifier());

        Ok(Self {
            config,
            api,
            cache,
            _refresh: refresh,
        })
    }

    fn require_token(&self) -> Result<()> {
        if self.api.has_token() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "Not signed in. Run `campuscache login` or set CAMPUSCACHE_TOKEN."
            ))
        }
    }
}

fn open_session(config: &Config) -> Result<SessionAuth> {
    let session = SessionAuth::new(config.api_url(), config.request_timeout())?
        .with_cache_dir(config.cache_dir()?);
    if let Err(e) = session.load() {
        warn!(error = %e, "Ignoring unreadable session");
    }
    Ok(session)
}

fn open_prefs(config: &Config) -> Result<Preferences> {
    Preferences::open(&config.cache_dir()?)
}

// ===== Session =====

pub async fn login(email: Option<&str>) -> Result<()> {
    let mut config = Config::load()?;
    config.apply_env();

    let email = match email.map(str::to_string).or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    let session = open_session(&config)?;
    let data = session
        .login(&email, &password)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    match data.user {
        Some(user) => println!("Signed in as {} ({})", user.name, user.role.display_name()),
        None => println!("Signed in"),
    }
    Ok(())
}

pub fn logout() -> Result<()> {
    let config = Config::load()?;
    open_session(&config)?.clear()?;
    println!("Signed out");
    Ok(())
}

pub fn whoami() -> Result<()> {
    let config = Config::load()?;
    let session = open_session(&config)?;
    match session.data() {
        Some(data) => {
            let who = data
                .user
                .as_ref()
                .map(|u| format!("{} <{}>", u.name, u.email))
                .unwrap_or_else(|| "unknown user".to_string());
            if data.is_expired() {
                println!("{} (session expired)", who);
            } else {
                println!("{} (expires in {} min)", who, data.minutes_until_expiry());
            }
        }
        None => println!("Not signed in"),
    }
    Ok(())
}

// ===== Courses =====

pub async fn courses((page, limit): (u32, u32)) -> Result<()> {
    let ctx = AppContext::load()?;
    ctx.require_token()?;

    let mut view = ctx
        .cache
        .subscribe(queries::courses::courses(&ctx.api, CourseFilter::page(page, limit)))?;
    let state = view.wait_settled().await;
    print_courses(&state)?;
    remember_page(&ctx, page, limit);
    Ok(())
}

pub async fn approve(id: &str) -> Result<()> {
    let ctx = AppContext::load()?;
    ctx.require_token()?;

    let approve = queries::courses::approve_course(&ctx.cache, &ctx.api);
    let course = approve
        .mutate(id.to_string())
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("{} is now {}", course.title, course.status.display_name());
    Ok(())
}

/// List a page of courses and keep it live: each line on stdin is treated as
/// a realtime event name and fed through the bridge.
pub async fn watch((page, limit): (u32, u32)) -> Result<()> {
    let ctx = AppContext::load()?;
    ctx.require_token()?;

    let transport = Arc::new(LocalTransport::new());
    let _guard = RealtimeBridge::new(transport.clone(), ctx.cache.clone())
        .bind(queries::default_bindings())?;

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let event = line.trim();
            if event.is_empty() {
                continue;
            }
            if !channels::is_known(event) {
                eprintln!("unknown event '{}' (known: {})", event, channels::ALL.join(", "));
                continue;
            }
            let delivered = transport.emit(event, Value::Null);
            debug!(event, delivered, "Forwarded stdin event");
        }
    });

    let mut view = ctx
        .cache
        .subscribe(queries::courses::courses(&ctx.api, CourseFilter::page(page, limit)))?;
    print_watched(&view.wait_settled().await)?;
    loop {
        let state = view.changed().await?;
        if state.is_loading() {
            eprintln!("[{}] refreshing...", Local::now().format("%H:%M:%S"));
        } else {
            print_watched(&state)?;
        }
    }
}

/// A failed refetch is reported and the watch keeps running; the next event
/// may well succeed.
fn print_watched(state: &QueryState<ListPage<Course>>) -> Result<()> {
    if let Some(message) = state.error_message() {
        eprintln!("[{}] refresh failed: {}", Local::now().format("%H:%M:%S"), message);
        return Ok(());
    }
    print_courses(state)
}

fn print_courses(state: &QueryState<ListPage<Course>>) -> Result<()> {
    if let Some(err) = &state.error {
        return Err(anyhow::anyhow!(err.user_message()));
    }
    let Some(page) = &state.data else {
        println!("No data");
        return Ok(());
    };

    for course in &page.items {
        println!(
            "{:<26} {:<16} {:<8} {}",
            course.id,
            course.status.display_name(),
            course.price_display(),
            course.title
        );
    }
    if let Some(p) = page.pagination {
        println!("-- page {} of {} ({} courses)", p.page, p.total_pages(), p.total);
    }
    Ok(())
}

fn remember_page(ctx: &AppContext, page: u32, limit: u32) {
    let result = open_prefs(&ctx.config)
        .and_then(|mut prefs| prefs.set_json("courses.filter", &CourseFilter::page(page, limit)));
    if let Err(e) = result {
        debug!(error = %e, "Could not store course filter preference");
    }
}

// ===== Raw endpoints =====

pub async fn get(endpoint: &str, watch_secs: Option<u64>) -> Result<()> {
    let ctx = AppContext::load()?;

    let api = ctx.api.clone();
    let path = endpoint.to_string();
    let mut query = Query::new(CacheKey::new(endpoint), move || {
        let api = api.clone();
        let path = path.clone();
        async move { api.get::<Value>(&path).await }
    })
    .enabled(ctx.api.has_token());
    if let Some(secs) = watch_secs {
        query = query.refetch_interval(Duration::from_secs(secs.max(1)));
    }

    let mut view = ctx.cache.subscribe(query)?;
    if !view.is_enabled() {
        ctx.require_token()?;
    }

    print_value(&view.wait_settled().await)?;
    if watch_secs.is_none() {
        return Ok(());
    }
    loop {
        let state = view.changed().await?;
        if !state.is_fetching {
            print_value(&state)?;
        }
    }
}

fn print_value(state: &QueryState<Value>) -> Result<()> {
    if let Some(err) = &state.error {
        eprintln!("Error: {}", err.user_message());
        return Ok(());
    }
    if let Some(value) = &state.data {
        println!("{}", serde_json::to_string_pretty(value.as_ref())?);
    }
    Ok(())
}

// ===== Preferences =====

pub fn pref(args: &[String]) -> Result<()> {
    let config = Config::load()?;
    let mut prefs = open_prefs(&config)?;
    match args {
        [cmd] if cmd == "list" => {
            for (key, value) in prefs.iter() {
                println!("{} = {}", key, value);
            }
        }
        [cmd, key] if cmd == "get" => match prefs.get(key) {
            Some(value) => println!("{}", value),
            None => println!("{} is not set", key),
        },
        [cmd, key, value] if cmd == "set" => prefs.set(key.clone(), value.clone())?,
        [cmd, key] if cmd == "rm" => {
            if !prefs.remove(key)? {
                println!("{} is not set", key);
            }
        }
        _ => return Err(anyhow::anyhow!("usage: pref list | get <key> | set <key> <value> | rm <key>")),
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    print!("{}", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
