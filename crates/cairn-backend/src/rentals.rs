use chrono::{DateTime, Utc};

use cairn_types::api::{CreateRentalRequest, RentalRequestRecord, UpdateRentalStatus};
use cairn_types::models::{RentalRequest, RentalStatus};

use crate::{Backend, BackendError, eq_filter, sort};

impl Backend {
    pub async fn get_rental_request(
        &self,
        request_id: &str,
    ) -> Result<RentalRequest, BackendError> {
        let record: RentalRequestRecord = self.get_item("rental_requests", request_id).await?;
        Ok(record.into())
    }

    pub async fn rental_requests_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<RentalRequest>, BackendError> {
        self.rental_requests_by("owner", owner_id).await
    }

    pub async fn rental_requests_for_renter(
        &self,
        renter_id: &str,
    ) -> Result<Vec<RentalRequest>, BackendError> {
        self.rental_requests_by("renter", renter_id).await
    }

    async fn rental_requests_by(
        &self,
        role: &str,
        client_id: &str,
    ) -> Result<Vec<RentalRequest>, BackendError> {
        let records: Vec<RentalRequestRecord> = self
            .get_items(
                "rental_requests",
                &[eq_filter(role, client_id), sort("-start_date")],
            )
            .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    pub async fn create_rental_request(
        &self,
        gear_listing: &str,
        renter: &str,
        owner: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<RentalRequest, BackendError> {
        let payload = CreateRentalRequest {
            gear_listing,
            renter,
            owner,
            start_date,
            end_date,
        };
        let record: RentalRequestRecord = self.create_item("rental_requests", &payload).await?;
        Ok(record.into())
    }

    /// Flip a request's status. Notifying the affected party is the caller's
    /// side effect, not this layer's.
    pub async fn update_rental_request_status(
        &self,
        request_id: &str,
        status: RentalStatus,
    ) -> Result<RentalRequest, BackendError> {
        let payload = UpdateRentalStatus { status };
        let record: RentalRequestRecord = self
            .update_item("rental_requests", request_id, &payload)
            .await?;
        Ok(record.into())
    }
}
