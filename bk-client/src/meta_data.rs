//! Build meta-data endpoints

use crate::AgentClient;
use crate::error::Result;
use bk_core::dto::meta_data::{MetaDataExists, MetaDataKey, MetaDataValue, SetMetaData};
use uuid::Uuid;

impl AgentClient {
    pub async fn set_meta_data(&self, job_id: Uuid, key: &str, value: &str) -> Result<()> {
        let url = self.url(&format!("/jobs/{}/data/set", job_id));
        let request = self.authorize(self.client.post(url))?;
        let body = SetMetaData {
            key: key.to_string(),
            value: value.to_string(),
        };
        let response = request.json(&body).send().await?;

        self.handle_empty_response(response).await
    }

    pub async fn meta_data_exists(&self, job_id: Uuid, key: &str) -> Result<bool> {
        let url = self.url(&format!("/jobs/{}/data/exists", job_id));
        let request = self.authorize(self.client.post(url))?;
        let response = request
            .json(&MetaDataKey {
                key: key.to_string(),
            })
            .send()
            .await?;

        let body: MetaDataExists = self.handle_response(response).await?;
        Ok(body.exists)
    }

    /// Get a meta-data value
    ///
    /// # Returns
    /// `None` when the key was never set
    pub async fn get_meta_data(&self, job_id: Uuid, key: &str) -> Result<Option<String>> {
        let url = self.url(&format!("/jobs/{}/data/get", job_id));
        let request = self.authorize(self.client.post(url))?;
        let response = request
            .json(&MetaDataKey {
                key: key.to_string(),
            })
            .send()
            .await?;

        match self.handle_response::<MetaDataValue>(response).await {
            Ok(body) => Ok(Some(body.value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
