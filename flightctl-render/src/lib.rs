//! Fleet template -> Device spec rendering (§3, §4.1).
//!
//! A fleet's template is a [`flightctl_types::DeviceSpec`] whose string
//! fields may contain `{{ ... }}` placeholders drawn from a deliberately
//! restricted grammar — never a general templating language. [`template`]
//! owns that grammar; [`render`] applies it field-by-field against a single
//! device's restricted view and hashes the result.

pub mod render;
pub mod template;

pub use render::{hash_spec, render, RenderError};
pub use template::{Action, DeviceView, Node, TemplateError, Transform};
