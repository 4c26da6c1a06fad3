pub mod arxiv;
pub mod core_search;
pub mod pubchem;
pub mod registry;

pub use arxiv::ArxivTool;
pub use core_search::CoreSearchTool;
pub use pubchem::PubChemTool;
pub use registry::ToolRegistry;
