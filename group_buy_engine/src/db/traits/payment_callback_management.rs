use super::{data_objects::InsertCallbackResult, DatabaseBackend};
use crate::db_types::{NewPaymentCallback, PaymentCallbackRecord};

/// The durable record of payment callbacks. The presence of a `callback_id` is the only signal used to decide whether
/// a callback was already processed.
#[allow(async_fn_in_trait)]
pub trait PaymentCallbackManagement: DatabaseBackend {
    /// Records a callback. A concurrent insert of the same `callback_id` yields
    /// [`InsertCallbackResult::AlreadyExists`], not an error.
    async fn save_callback(&self, callback: NewPaymentCallback) -> Result<InsertCallbackResult, Self::Error>;

    async fn exists_by_callback_id(&self, callback_id: &str) -> Result<bool, Self::Error>;

    async fn find_by_callback_id(&self, callback_id: &str) -> Result<Option<PaymentCallbackRecord>, Self::Error>;
}
