use std::{process, sync::Arc};

use pressroom::{
    application::{
        error::AppError,
        images::{ImagePipeline, ImageUploadOptions, UploadFile},
        notify::TracingNotifier,
        posts::{BlogAdmin, PostListFilter},
    },
    cache::CacheConfig,
    client::{DataClient, RetryPolicy},
    config,
    domain::posts::PostStatus,
    infra::{error::InfraError, rest::RestDataService, telemetry, uploads::HttpImageUploader},
};
use serde::Serialize;
use serde_json::json;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(error = %report.render(), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %report.render(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    match cli_args.command {
        config::Command::Posts(args) => run_posts(&settings, args).await,
        config::Command::Categories => {
            let rows = build_admin(&settings)?.categories().await?;
            print_json(&rows)
        }
        config::Command::Tags => {
            let rows = build_admin(&settings)?.tags().await?;
            print_json(&rows)
        }
        config::Command::Upload(args) => run_upload(&settings, args).await,
    }
}

fn build_admin(settings: &config::Settings) -> Result<BlogAdmin, AppError> {
    let service = RestDataService::from_settings(&settings.service)?;
    let client = DataClient::new(
        Arc::new(service),
        &CacheConfig::from(&settings.cache),
        RetryPolicy::from(&settings.retry),
    );
    Ok(BlogAdmin::new(Arc::new(client), Arc::new(TracingNotifier)))
}

async fn run_posts(settings: &config::Settings, args: config::PostsArgs) -> Result<(), AppError> {
    let status = args
        .status
        .as_deref()
        .map(|name| {
            PostStatus::from_name(name).ok_or_else(|| {
                AppError::validation(format!(
                    "unknown status `{name}`; expected published, draft or scheduled"
                ))
            })
        })
        .transpose()?;
    let category_id = args
        .category_id
        .as_deref()
        .map(|raw| {
            Uuid::parse_str(raw)
                .map_err(|err| AppError::validation(format!("invalid category id `{raw}`: {err}")))
        })
        .transpose()?;

    let filter = PostListFilter {
        status,
        category_id,
        limit: args.limit,
        offset: args.offset,
    };
    let posts = build_admin(settings)?.refresh_posts(filter).await?;
    print_json(&posts)
}

async fn run_upload(settings: &config::Settings, args: config::UploadArgs) -> Result<(), AppError> {
    let uploader = HttpImageUploader::from_settings(settings)?;
    let pipeline = Arc::new(ImagePipeline::from_settings(
        Arc::new(uploader),
        &settings.uploads,
    ));
    let options = ImageUploadOptions::from(&settings.uploads);

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = UploadFile::from_path(path)
            .await
            .map_err(|err| InfraError::io(path, err))?;
        files.push(file);
    }

    let total = files.len();
    let results = pipeline.upload_many(files, &options).await;
    let mut failed = 0;
    let summary: Vec<_> = args
        .files
        .iter()
        .zip(results)
        .map(|(path, result)| match result {
            Ok(uploaded) => json!({ "file": path.display().to_string(), "upload": uploaded }),
            Err(err) => {
                failed += 1;
                json!({ "file": path.display().to_string(), "error": err.to_string() })
            }
        })
        .collect();
    print_json(&summary)?;

    info!(total, failed, "upload batch finished");
    if failed > 0 {
        return Err(AppError::unexpected(format!(
            "{failed} of {total} uploads failed"
        )));
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{text}");
    Ok(())
}
