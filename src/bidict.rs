// Bidirectional table between logical values and the literal tokens an instrument uses for them.
//
// Both directions are built together from one list of pairs and never change afterwards. A token
// is matched the way SCPI matches mnemonics: case-insensitively, in either its long form ("RISE"
// for "RISe") or its short form ("RIS"), so every form of every token must point at one value.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

#[derive(Debug, PartialEq)]
pub enum Conflict<L> {
	DuplicateValue(L),
	AmbiguousToken(String),
}

#[derive(Debug, Clone)]
pub struct BiMap<L> {
	forward: Vec<(L, &'static str)>,
	reverse: HashMap<String, L>,
}

// Long form is the whole mnemonic, short form is its leading upper-case part plus any numeric
// suffix, so "CHANnel2" shortens to "CHAN2"
fn forms(token: &str) -> (String, String) {
	let long = token.to_ascii_uppercase();
	let mut short: String = token.chars().take_while(|c| !c.is_ascii_lowercase()).collect();
	if short.len() < token.len() {
		let digits = token.len() - token.trim_end_matches(|c: char| c.is_ascii_digit()).len();
		short.push_str(&token[token.len() - digits..]);
	}
	(long, short)
}

fn normalize(reply: &str) -> String {
	reply.trim().trim_matches('"').to_ascii_uppercase()
}

/// Whether `word` spells the mnemonic (e.g. "XINcr") in its long or short form.
pub fn matches_mnemonic(mnemonic: &str, word: &str) -> bool {
	let (long, short) = forms(mnemonic);
	let word = normalize(word);
	word == long || word == short
}

impl<L: Copy + Eq + Hash + Debug> BiMap<L> {

	pub fn from_pairs(pairs: &[(L, &'static str)]) -> Result<Self, Conflict<L>> {
		let mut forward: Vec<(L, &'static str)> = Vec::with_capacity(pairs.len());
		let mut reverse: HashMap<String, L> = HashMap::new();

		for &(value, token) in pairs {
			if forward.iter().any(|(v, _)| *v == value) {
				return Err(Conflict::DuplicateValue(value));
			}

			let (long, short) = forms(token);
			for form in [long, short].iter() {
				if form.is_empty() { continue; }
				match reverse.get(form) {
					Some(existing) if *existing != value => return Err(Conflict::AmbiguousToken(token.to_owned())),
					_ => { reverse.insert(form.clone(), value); }
				}
			}

			forward.push((value, token));
		}

		Ok(Self { forward, reverse })
	}

	pub fn literal(&self, value: L) -> Option<&'static str> {
		self.forward.iter().find(|(v, _)| *v == value).map(|(_, t)| *t)
	}

	pub fn logical(&self, reply: &str) -> Option<L> {
		self.reverse.get(&normalize(reply)).copied()
	}

	pub fn values(&self) -> impl Iterator<Item = L> + '_ {
		self.forward.iter().map(|(v, _)| *v)
	}

	pub fn len(&self) -> usize { self.forward.len() }
	pub fn is_empty(&self) -> bool { self.forward.is_empty() }
}
