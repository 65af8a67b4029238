/// Status strings pushed by the confirmation service on a signature channel.
///
/// These must match the server byte for byte.
pub mod channel_messages {
    /// The service gave up waiting for this signature
    pub const TRANSACTION_TIMEOUT: &str = "Transaction timeout";
    /// The service saw the signature confirmed
    pub const TRANSACTION_CONFIRMED: &str = "Transaction confirmed";
}

/// Default toast texts shown while a batch is pending or when it terminates
pub mod toasts {
    pub const LOADING: &str = "Transaction submitted, waiting for confirmation...";
    pub const SUCCESS: &str = "Transaction confirmed";
    pub const FAILURE: &str = "Transaction failed";
    pub const TIMEOUT: &str = "Transaction timed out. Please check your wallet and try again";
}

/// Instance key of the shared transport used for signature confirmation
pub const SIGNATURE_CONFIRMER_INSTANCE: &str = "signature-confirmer";
