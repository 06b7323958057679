use std::{process, sync::Arc};

use slopfeed::{
    application::{
        ai_queue::AiPostQueue,
        auth::AuthService,
        error::AppError,
        experiments::ExperimentService,
        feed::FeedService,
        generation::{GenerationWorker, TextGenerator},
        interactions::InteractionService,
        repos::{
            AiPostsRepo, ExperimentsRepo, FeedRepo, HealthRepo, InteractionsRepo, PostsRepo,
            UsersRepo,
        },
    },
    config,
    domain::types::GenerationMode,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        llm, telemetry,
    },
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::ClearServed(args) => run_clear_served(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let queue = Arc::new(AiPostQueue::new(settings.generation.queue_capacity.get()));
    let app = build_application_context(repositories.clone(), queue.clone(), &settings);

    if settings.feed.clear_served_on_start {
        app.feed
            .clear_served(None)
            .await
            .map_err(|err| AppError::unexpected(format!("failed to clear served posts: {err}")))?;
    }

    let producer = spawn_producer(&settings, repositories, queue)?;

    let result = serve_http(&settings, http::build_router(app.http_state)).await;

    if let Some(handle) = producer {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn run_clear_served(
    settings: config::Settings,
    args: config::ClearServedArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let feed_repo: Arc<dyn FeedRepo> = repositories;
    let removed = feed_repo.clear_served(args.user_id).await?;

    info!(
        target = "slopfeed::clear_served",
        user_id = ?args.user_id,
        removed,
        "Served ledger cleared"
    );
    Ok(())
}

struct ApplicationContext {
    http_state: HttpState,
    feed: Arc<FeedService>,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    queue: Arc<AiPostQueue>,
    settings: &config::Settings,
) -> ApplicationContext {
    let feed_repo: Arc<dyn FeedRepo> = repositories.clone();
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let ai_posts_repo: Arc<dyn AiPostsRepo> = repositories.clone();
    let interactions_repo: Arc<dyn InteractionsRepo> = repositories.clone();
    let experiments_repo: Arc<dyn ExperimentsRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories;

    let feed = Arc::new(FeedService::new(
        feed_repo,
        queue,
        settings.feed.sampler(),
        settings
            .feed
            .feed_settings(settings.generation.drain_limit),
    ));
    let experiments = ExperimentService::new(
        users_repo.clone(),
        experiments_repo,
        settings.experiments.clone(),
    );
    let interactions = Arc::new(InteractionService::new(
        posts_repo,
        ai_posts_repo,
        interactions_repo,
        experiments.clone(),
    ));
    let auth = Arc::new(AuthService::new(users_repo, settings.auth.auth_settings()));

    if settings.auth.dev_no_password {
        warn!(
            target = "slopfeed::serve",
            "auth.dev_no_password is enabled; any username can log in"
        );
    }

    ApplicationContext {
        http_state: HttpState {
            feed: feed.clone(),
            interactions,
            experiments: Arc::new(experiments),
            auth,
            health: health_repo,
        },
        feed,
    }
}

fn spawn_producer(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    queue: Arc<AiPostQueue>,
) -> Result<Option<JoinHandle<()>>, AppError> {
    let generation = &settings.generation;
    if !generation.enabled {
        info!(target = "slopfeed::serve", "AI post producer disabled");
        return Ok(None);
    }

    let generator: Option<Arc<dyn TextGenerator>> = match generation.mode {
        GenerationMode::Llm => Some(llm::build_generator(generation).map_err(AppError::from)?),
        GenerationMode::Archive => None,
    };
    let archive: Arc<dyn AiPostsRepo> = repositories;

    let worker = Arc::new(GenerationWorker::new(
        queue,
        archive,
        generator,
        generation.generation_settings(),
    ));
    Ok(Some(worker.spawn()))
}

async fn serve_http(settings: &config::Settings, router: axum::Router) -> Result<(), AppError> {
    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "slopfeed::serve",
        addr = %settings.server.addr,
        "HTTP server listening"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = stop_rx.await;
    });
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut server => return server_outcome(joined),
        () = shutdown_signal() => {}
    }

    info!(
        target = "slopfeed::serve",
        grace_ms = settings.server.graceful_shutdown.as_millis() as u64,
        "Shutdown requested, draining connections"
    );
    let _ = stop_tx.send(());

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                target = "slopfeed::serve",
                "Graceful shutdown timed out; closing remaining connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target = "slopfeed::serve",
            error = %err,
            "Failed to listen for Ctrl-C; shutdown only via process termination"
        );
        std::future::pending::<()>().await;
    }
}
