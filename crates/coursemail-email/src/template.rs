//! Placeholder rendering for stored mail templates
//!
//! Templates carry `{{key}}` tokens (whitespace inside the braces is ignored)
//! which are replaced from a flat JSON object. There are no loops, conditionals
//! or escaping.

use regex::{Captures, Regex};
use serde_json::Value;

use crate::prelude::*;

/// What to do with a token whose key has no value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingKey {
	/// Render as an empty string
	#[default]
	Blank,
	/// Leave the `{{key}}` token in the output
	Keep,
}

/// Rendered subject and bodies of one mail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
	pub subject: String,
	pub html_body: String,
	pub text_body: String,
}

pub struct TemplateEngine {
	token: Regex,
	tag: Regex,
	missing: MissingKey,
}

impl TemplateEngine {
	pub fn new(missing: MissingKey) -> ClResult<Self> {
		let token = Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}")
			.map_err(|e| Error::Internal(format!("placeholder pattern: {}", e)))?;
		let tag = Regex::new(r"(?s)<[^>]*>")
			.map_err(|e| Error::Internal(format!("tag pattern: {}", e)))?;
		Ok(Self { token, tag, missing })
	}

	/// Replace every `{{key}}` token with the matching value from `vars`
	pub fn render(&self, template: &str, vars: &Value) -> String {
		if !template.contains("{{") {
			return template.to_string();
		}

		self.token
			.replace_all(template, |caps: &Captures<'_>| {
				let key = caps.get(1).map_or("", |m| m.as_str());
				match vars.get(key) {
					Some(value) => value_to_string(value),
					None => match self.missing {
						MissingKey::Blank => String::new(),
						MissingKey::Keep => caps.get(0).map_or("", |m| m.as_str()).to_string(),
					},
				}
			})
			.into_owned()
	}

	/// Render a subject and HTML body pair, deriving the plain text alternative
	pub fn render_mail(&self, subject: &str, body_html: &str, vars: &Value) -> RenderResult {
		let html_body = self.render(body_html, vars);
		RenderResult {
			subject: self.render(subject, vars),
			text_body: self.html_to_text(&html_body),
			html_body,
		}
	}

	/// Crude plain text version of an HTML body for the text/plain part
	pub fn html_to_text(&self, html: &str) -> String {
		let html = html
			.replace("<br>", "\n")
			.replace("<br/>", "\n")
			.replace("<br />", "\n")
			.replace("</p>", "</p>\n");
		let text = self.tag.replace_all(&html, "");
		let text = text
			.replace("&nbsp;", " ")
			.replace("&lt;", "<")
			.replace("&gt;", ">")
			.replace("&quot;", "\"")
			.replace("&#39;", "'")
			.replace("&amp;", "&");

		let lines: Vec<&str> = text.lines().map(str::trim).collect();
		let mut out = String::new();
		let mut blank = true;
		for line in lines {
			if line.is_empty() {
				if !blank {
					out.push('\n');
				}
				blank = true;
			} else {
				out.push_str(line);
				out.push('\n');
				blank = false;
			}
		}
		out.trim_end().to_string()
	}
}

fn value_to_string(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn engine() -> TemplateEngine {
		TemplateEngine::new(MissingKey::Blank).unwrap()
	}

	#[test]
	fn test_no_tokens_unchanged() {
		let s = "<p>Hello {world}, 100% plain</p>";
		assert_eq!(engine().render(s, &json!({ "world": "x" })), s);
	}

	#[test]
	fn test_replaces_with_whitespace() {
		let out = engine().render(
			"Batch {{batch_no}} starts {{ start_date }}",
			&json!({ "batch_no": "PDFT-101", "start_date": "06-Jan-2025" }),
		);
		assert_eq!(out, "Batch PDFT-101 starts 06-Jan-2025");
	}

	#[test]
	fn test_repeated_token() {
		let out = engine().render("{{name}} / {{name}}", &json!({ "name": "Jane" }));
		assert_eq!(out, "Jane / Jane");
	}

	#[test]
	fn test_missing_key_policy() {
		let vars = json!({ "name": "Jane" });
		assert_eq!(engine().render("Hi {{name}}{{suffix}}!", &vars), "Hi Jane!");

		let keep = TemplateEngine::new(MissingKey::Keep).unwrap();
		assert_eq!(keep.render("Hi {{name}}{{ suffix }}!", &vars), "Hi Jane{{ suffix }}!");
	}

	#[test]
	fn test_non_string_values() {
		let out = engine().render("{{n}} {{b}} [{{z}}]", &json!({ "n": 7, "b": true, "z": null }));
		assert_eq!(out, "7 true []");
	}

	#[test]
	fn test_no_escaping() {
		let out = engine().render("{{link}}", &json!({ "link": "<a href=\"x\">form</a>" }));
		assert_eq!(out, "<a href=\"x\">form</a>");
	}

	#[test]
	fn test_render_mail() {
		let res = engine().render_mail(
			"Welcome {{name}}",
			"<p>Dear {{name}},</p><p>See you on <b>{{date}}</b>.</p>",
			&json!({ "name": "Jane", "date": "06-Jan-2025" }),
		);
		assert_eq!(res.subject, "Welcome Jane");
		assert_eq!(res.html_body, "<p>Dear Jane,</p><p>See you on <b>06-Jan-2025</b>.</p>");
		assert_eq!(res.text_body, "Dear Jane,\nSee you on 06-Jan-2025.");
	}

	#[test]
	fn test_html_to_text_entities() {
		let text = engine().html_to_text("<p>A &amp; B</p>\n\n\n<p>Regards,<br/>Team</p>");
		assert_eq!(text, "A & B\n\nRegards,\nTeam");
	}
}

// vim: ts=4
