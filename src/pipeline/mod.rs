//! Pipeline stages for analysing one uploaded exam paper.
//!
//! Each submodule implements exactly one step, so each can be tested on
//! its own and the two network collaborators can be swapped for fakes.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ stage ──▶ ocr ──▶ llm ──▶ repair
//!  (type/size)  (temp file) (text)  (chat)  (JSON)
//! ```
//!
//! 1. [`validate`] — reject empty, non-PDF, or oversized uploads
//! 2. [`stage`]    — write the upload to a uniquely named temporary file
//!    that is removed on every exit path
//! 3. [`ocr`]      — send the staged file to the OCR service, get text back
//! 4. [`llm`]      — ask the chat model which syllabus topics the paper
//!    covers; the only stage with a retry policy
//! 5. [`repair`]   — clean the model reply into a strict record list

pub mod llm;
pub mod ocr;
pub mod repair;
pub mod stage;
pub mod validate;
