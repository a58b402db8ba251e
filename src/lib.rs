pub mod auth;
pub mod db;
pub mod feed;
pub mod impact;
pub mod routes;
pub mod storage;

use db::DbPool;
use feed::DonationFeed;
use opendal::Operator;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub storage: Operator,
    pub feed: DonationFeed,
    pub index_template: String,
}
