pub mod arxiv;

pub use arxiv::ArxivSource;
