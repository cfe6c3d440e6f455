pub mod postgres;

pub use postgres::PostgresListingStore;
