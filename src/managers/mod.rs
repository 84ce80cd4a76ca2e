// Stateful managers of the synchronization core.
// The view projection, bucket counts, collections and the signed-in identity.

pub mod collection_directory;
pub mod count_aggregator;
pub mod identity;
pub mod projection;
