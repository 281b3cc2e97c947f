//! Fetch-and-stage of browser-facing pages.

use console::style;

use qualer_stage::unwrap::Payload;
use qualer_stage::{AuthSession, Settings, StoreOutcome};

use super::helpers::SessionArgs;

pub async fn cmd_fetch(
    mut settings: Settings,
    args: SessionArgs,
    url: &str,
    service: Option<&str>,
) -> anyhow::Result<()> {
    args.apply(&mut settings);
    let url = url.to_string();
    let service = service.map(str::to_string);

    let payload = AuthSession::scoped(settings, args.credentials(), move |session| {
        Box::pin(async move {
            match service {
                Some(service) => {
                    let (payload, outcome) = session.fetch_and_store(&url, &service).await?;
                    report(&url, &service, outcome);
                    Ok(payload)
                }
                None => session.fetch(&url).await,
            }
        })
    })
    .await?;

    match payload {
        Payload::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Payload::Raw(body) => println!("{}", body),
    }
    Ok(())
}

pub(super) fn report(url: &str, service: &str, outcome: StoreOutcome) {
    match outcome {
        StoreOutcome::Inserted => {
            eprintln!("{} Staged {} as {}", style("✓").green(), url, service)
        }
        StoreOutcome::Duplicate => eprintln!(
            "{} {} was already staged for {}",
            style("!").yellow(),
            url,
            service
        ),
    }
}
