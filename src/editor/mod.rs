//! Buffered row editing on top of immutable roots.

mod error;
mod session;
mod table_editor;

pub use error::{EditError, EditResult};
pub use session::{EditorProps, TableEditSession};
pub use table_editor::TableEditor;
