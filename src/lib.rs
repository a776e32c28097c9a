pub mod actions;
pub mod badges;
pub mod client;
pub mod config;
pub mod db;
pub mod format;
pub mod mentions;
pub mod server;
pub mod site;
pub mod sqlite3db;
pub mod tree;
pub mod util;
pub mod xp;
