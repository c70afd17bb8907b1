//! Pipeline stages for markdown export.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different browser backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ directives ──▶ markup ──▶ resources ──▶ assemble ──▶ render
//! (read+FM)  (include/uml)  (comrak)   (tl rewrite)   (template)   (chrome)
//! ```
//!
//! 1. [`source`]: read the file, split off front-matter
//! 2. [`directives`]: expand `:[alt](file)` includes, `:::` containers and
//!    PlantUML blocks; [`encode`] compresses the diagram text
//! 3. [`markup`]: comrak with GFM extensions, highlighted code, mermaid
//! 4. [`resources`]: image `src` normalization and heading anchors
//! 5. [`assemble`]: template, stylesheets, mermaid script
//! 6. [`destination`]: where the output goes
//! 7. [`render`]: PDF / PNG / JPEG through headless Chrome; runs in
//!    `spawn_blocking` because CDP calls block

pub mod assemble;
pub mod destination;
pub mod directives;
pub mod encode;
pub mod markup;
pub mod render;
pub mod resources;
pub mod source;
