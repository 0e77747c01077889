pub mod model;

pub use model::{Song, SongId};
