use clap::Args;

use dchannel_daemon::http_server::api::v0::identity::RecipientResponse;
use dchannel_daemon::http_server::api::response::Envelope;
use dchannel_daemon::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Health;


#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = std::convert::Infallible;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        // 1. Check config directory
        lines.push("Config:".to_string());
        match AppState::load(ctx.config_path.clone()) {
            Ok(state) => {
                lines.push(format!("  directory:    {}", state.app_dir.display()));
                lines.push("  config.toml:  OK".to_string());
                lines.push("  db.sqlite:    OK".to_string());
                let identity = if state.identity_path.exists() {
                    "OK"
                } else {
                    "not created yet"
                };
                lines.push(format!("  identity.age: {}", identity));
                lines.push(format!("  api_port:     {}", state.config.api_port));
                lines.push(format!(
                    "  poll every:   {}s",
                    state.config.poll_interval().as_secs()
                ));
            }
            Err(e) => {
                lines.push(format!("  error: {}", e));
            }
        }

        // 2. Check daemon liveness
        let base = ctx.client.base_url();
        let client = ctx.client.http_client();

        lines.push(String::new());
        lines.push(format!("Daemon ({}):", base));

        let livez_url = format!("{}/_status/livez", base.as_str().trim_end_matches('/'));
        match client.get(&livez_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                lines.push("  livez:  OK".to_string());
            }
            Ok(resp) => {
                lines.push(format!("  livez:  UNHEALTHY ({})", resp.status()));
            }
            Err(_) => {
                lines.push("  livez:  NOT REACHABLE".to_string());
            }
        }

        // 3. Check daemon readiness
        let readyz_url = format!("{}/_status/readyz", base.as_str().trim_end_matches('/'));
        match client.get(&readyz_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                lines.push("  readyz: OK".to_string());
            }
            Ok(resp) => {
                lines.push(format!("  readyz: UNHEALTHY ({})", resp.status()));
            }
            Err(_) => {
                lines.push("  readyz: NOT REACHABLE".to_string());
            }
        }

        // 4. Identity
        let recipient_url = format!(
            "{}/api/v0/identity/recipient",
            base.as_str().trim_end_matches('/')
        );
        if let Ok(resp) = client.get(&recipient_url).send().await {
            match resp.json::<Envelope<RecipientResponse>>().await {
                Ok(Envelope {
                    data: Some(RecipientResponse {
                        recipient: Some(recipient),
                        ..
                    }),
                    ..
                }) => lines.push(format!("  identity: unlocked ({})", recipient)),
                Ok(_) => lines.push("  identity: locked".to_string()),
                Err(_) => lines.push("  identity: UNKNOWN".to_string()),
            }
        }

        Ok(lines.join("\n"))
    }
}
