/// Farmer registry: profile lookups and certification status management
use crate::{
    account::User,
    db::{AccountStore, CertificationStatus, Role},
    error::{AppError, AppResult},
    metrics,
};
use serde::{Deserialize, Serialize};

/// Status update request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: CertificationStatus,
}

/// Public status view of a farmer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmerStatus {
    pub status: CertificationStatus,
    pub name: String,
    pub farm_size: Option<f64>,
    pub crop_type: Option<String>,
}

/// Farmer registry service
#[derive(Clone)]
pub struct FarmerManager {
    store: AccountStore,
}

impl FarmerManager {
    pub fn new(store: AccountStore) -> Self {
        Self { store }
    }

    /// All farmers, newest first
    pub async fn list_farmers(&self) -> AppResult<Vec<User>> {
        let farmers = self.store.list_by_role(Role::Farmer).await?;
        Ok(farmers.into_iter().map(User::from).collect())
    }

    /// Fresh profile of the caller; status is read from the store, never from the token
    pub async fn get_profile(&self, account_id: &str) -> AppResult<User> {
        self.store
            .find_by_id(account_id)
            .await?
            .map(User::from)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Certification status of one farmer
    pub async fn get_status(&self, farmer_id: &str) -> AppResult<FarmerStatus> {
        let farmer = self
            .store
            .find_by_id_and_role(farmer_id, Role::Farmer)
            .await?
            .ok_or_else(|| not_found(farmer_id))?;

        Ok(FarmerStatus {
            status: farmer.status,
            name: farmer.name,
            farm_size: farmer.farm_size,
            crop_type: farmer.crop_type,
        })
    }

    /// Set a farmer's status. Any transition is allowed, including to the current value.
    pub async fn update_status(
        &self,
        farmer_id: &str,
        status: CertificationStatus,
    ) -> AppResult<User> {
        let farmer = self
            .store
            .update_status(farmer_id, status)
            .await?
            .ok_or_else(|| not_found(farmer_id))?;

        tracing::info!(farmer_id, status = %status, "certification status updated");
        metrics::record_status_change(status.as_str());

        Ok(User::from(farmer))
    }
}

fn not_found(farmer_id: &str) -> AppError {
    AppError::NotFound(format!("Farmer with ID {} not found", farmer_id))
}
