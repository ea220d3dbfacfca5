pub mod email;
pub mod invoice;
pub mod notifier;
pub mod payment_gateway;
pub mod pdf;
pub mod storage;

pub use email::{EmailError, EmailService};
pub use invoice::VatBreakdown;
pub use notifier::{notify, Notice};
pub use payment_gateway::{
    GatewayError, IntentStatus, PaymentGateway, PaymentIntent, SimulatedGateway, StripeGateway,
};
pub use pdf::{InvoiceDocument, PdfError, PdfService};
pub use storage::{FileStorage, StorageError, UploadKind};
