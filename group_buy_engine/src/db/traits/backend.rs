/// Behaviour shared by every storage backend. The other storage traits extend this one so that a backend exposes a
/// single error type across all of them.
#[allow(async_fn_in_trait)]
pub trait DatabaseBackend: Clone {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The URL of the database
    fn url(&self) -> &str;

    /// Closes the connection pool. Calls made afterwards will fail.
    async fn close(&mut self);
}
