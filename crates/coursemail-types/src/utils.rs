//! Utility functions

/// Split a comma-separated address list, dropping blanks
pub fn parse_email_list(s: &str) -> Vec<String> {
	s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(ToOwned::to_owned).collect()
}

/// Cheap address sanity check used before handing a recipient to SMTP
pub fn looks_like_email(s: &str) -> bool {
	let s = s.trim();
	if s.contains(char::is_whitespace) {
		return false;
	}
	match s.split_once('@') {
		Some((local, domain)) => {
			!local.is_empty()
				&& !domain.contains('@')
				&& domain.split_once('.').is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
		}
		None => false,
	}
}


// vim: ts=4
