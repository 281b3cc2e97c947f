//! Endpoint calls through the dual-path executor.

use console::style;
use tracing::info;

use qualer_stage::{AuthSession, EndpointRequest, FetchPath, Settings};

use super::fetch::report;
use super::helpers::SessionArgs;

pub async fn cmd_call(
    mut settings: Settings,
    args: SessionArgs,
    request: EndpointRequest,
    service: Option<&str>,
) -> anyhow::Result<()> {
    args.apply(&mut settings);
    let service = service.map(str::to_string);

    let executed = AuthSession::scoped(settings, args.credentials(), move |session| {
        Box::pin(async move {
            match service {
                Some(service) => {
                    let (executed, outcome) =
                        session.execute_and_store(&request, &service).await?;
                    report(&executed.url, &service, outcome);
                    Ok(executed)
                }
                None => session.execute(&request).await,
            }
        })
    })
    .await?;

    if executed.path == FetchPath::Browser {
        eprintln!(
            "{} Direct HTTP was rejected; answered through the browser",
            style("!").yellow()
        );
    }
    info!("{} answered with status {}", executed.url, executed.status);
    println!("{}", serde_json::to_string_pretty(&executed.payload)?);
    Ok(())
}
