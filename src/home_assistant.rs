use crate::sensor::SensorState;

/// Publishes sensor states to Home Assistant through its REST API.
pub struct HomeAssistantAPI {
    endpoint_url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl HomeAssistantAPI {
    pub fn with_connection(client: reqwest::Client, endpoint_url: &str, auth_token: &str) -> Self {
        Self {
            endpoint_url: endpoint_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.to_string(),
            client,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint_url.is_empty()
    }

    pub async fn publish_state(
        &self,
        entity_id: &str,
        sensor: &SensorState,
    ) -> Result<(), anyhow::Error> {
        if self.endpoint_url.is_empty() {
            anyhow::bail!("No HA connection");
        }
        self.client
            .post(format!("{}/api/states/{}", self.endpoint_url, entity_id))
            .bearer_auth(&self.auth_token)
            .json(sensor)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
