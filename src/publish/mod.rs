pub mod encode;
pub mod operations;
pub mod transport;

pub use operations::{AggregatorPublisher, TimeSeriesPublisher};
pub use transport::{HttpTransport, PublishError, Transport};
