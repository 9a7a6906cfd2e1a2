//! Record codec: one rule <-> one list element.
//! A record is `ptype, field1, field2, ...`. Fields that would not survive a plain comma split
//! are double-quoted with embedded quotes doubled, and the parser undoes exactly that.

use tracing::warn;

use crate::error::{AdapterError, LineError, Result};
use crate::model::{section_of, PolicyModel};

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyLine {
    pub ptype: String,
    pub rule: Vec<String>,
}

fn needs_quoting(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.trim() != field
}

/// Join rule fields with `", "`, quoting fields that contain delimiters.
pub fn array_to_string<S: AsRef<str>>(fields: &[S]) -> String {
    let mut out = String::new();
    for (i, f) in fields.iter().enumerate() {
        if i > 0 { out.push_str(", "); }
        let f = f.as_ref();
        if needs_quoting(f) {
            out.push('"');
            out.push_str(&f.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(f);
        }
    }
    out
}

/// Serialized form of one rule as stored in the list.
/// A rule with no fields is the bare ptype, so it decodes back to an empty rule and not to `[""]`.
pub fn encode_rule<S: AsRef<str>>(ptype: &str, rule: &[S]) -> String {
    if rule.is_empty() { return ptype.to_string(); }
    format!("{}, {}", ptype, array_to_string(rule))
}

fn split_fields(line: &str) -> std::result::Result<Vec<String>, LineError> {
    let mut out = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        // skip leading whitespace of the token
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) { chars.next(); }
        let mut tok = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => { chars.next(); tok.push('"'); }
                    Some('"') => break,
                    Some(c) => tok.push(c),
                    None => return Err(LineError::UnterminatedQuote),
                }
            }
            // tolerate trailing blanks after the closing quote
            while matches!(chars.peek(), Some(c) if *c != ',') { chars.next(); }
            out.push(tok);
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' { break; }
                tok.push(c);
                chars.next();
            }
            out.push(tok.trim_end().to_string());
        }
        match chars.next() {
            Some(',') => continue,
            _ => break,
        }
    }
    Ok(out)
}

/// Decode one record. Blank lines and `#` comments yield `None`.
pub fn parse_policy_line(line: &str) -> std::result::Result<Option<PolicyLine>, LineError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') { return Ok(None); }
    let mut fields = split_fields(line)?;
    if fields.first().map_or(true, |p| p.is_empty()) { return Err(LineError::MissingPtype); }
    let rule = fields.split_off(1);
    let ptype = fields.pop().unwrap_or_default();
    Ok(Some(PolicyLine { ptype, rule }))
}

fn insert_line(line: &str, model: &mut PolicyModel) -> std::result::Result<(), LineError> {
    let Some(parsed) = parse_policy_line(line)? else { return Ok(()) };
    let sec = section_of(&parsed.ptype).ok_or_else(|| LineError::UnknownPtype(parsed.ptype.clone()))?;
    if !model.add_policy(sec, &parsed.ptype, parsed.rule) {
        return Err(LineError::UnknownPtype(parsed.ptype));
    }
    Ok(())
}

/// Strategy that turns one stored record into a model entry.
pub trait PolicyLineHandler {
    fn load_line(&self, line: &str, model: &mut PolicyModel) -> Result<()>;

    /// A stored element that is not UTF-8. By default its lossy text goes through `load_line`.
    fn load_invalid_utf8(&self, raw: &[u8], model: &mut PolicyModel) -> Result<()> {
        self.load_line(&String::from_utf8_lossy(raw), model)
    }
}

/// Decode one raw list element and hand it to `handler`.
pub fn load_record<H: PolicyLineHandler + ?Sized>(handler: &H, raw: &[u8], model: &mut PolicyModel) -> Result<()> {
    match std::str::from_utf8(raw) {
        Ok(line) => handler.load_line(line, model),
        Err(_) => handler.load_invalid_utf8(raw, model),
    }
}

/// Skips records it cannot place in the model. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct LenientLineHandler;

impl PolicyLineHandler for LenientLineHandler {
    fn load_line(&self, line: &str, model: &mut PolicyModel) -> Result<()> {
        if let Err(e) = insert_line(line, model) {
            warn!(target: "redis_policy_adapter::codec", "skipping policy record {:?}: {}", line, e);
        }
        Ok(())
    }

    fn load_invalid_utf8(&self, raw: &[u8], _model: &mut PolicyModel) -> Result<()> {
        warn!(target: "redis_policy_adapter::codec", "skipping policy record {:?}: {}", String::from_utf8_lossy(raw), LineError::InvalidUtf8);
        Ok(())
    }
}

/// Fails the whole load on the first record it cannot place.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictLineHandler;

impl PolicyLineHandler for StrictLineHandler {
    fn load_line(&self, line: &str, model: &mut PolicyModel) -> Result<()> {
        insert_line(line, model).map_err(|e| AdapterError::malformed(line, e))
    }

    fn load_invalid_utf8(&self, raw: &[u8], _model: &mut PolicyModel) -> Result<()> {
        Err(AdapterError::malformed(String::from_utf8_lossy(raw), LineError::InvalidUtf8))
    }
}

impl<F> PolicyLineHandler for F
where
    F: Fn(&str, &mut PolicyModel) -> Result<()>,
{
    fn load_line(&self, line: &str, model: &mut PolicyModel) -> Result<()> { self(line, model) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(fields: &[&str]) -> Vec<String> { fields.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn encode_plain_rule() {
        assert_eq!(encode_rule("p", &["bob", "data1", "read"]), "p, bob, data1, read");
        assert_eq!(encode_rule("g", &["alice", "admin"]), "g, alice, admin");
    }

    #[test]
    fn encode_quotes_delimiters() {
        assert_eq!(array_to_string(&["a,b", "say \"hi\"", " pad"]), "\"a,b\", \"say \"\"hi\"\"\", \" pad\"");
    }

    #[test]
    fn parse_plain_and_quoted() {
        let l = parse_policy_line("p, bob, data1, read").unwrap().unwrap();
        assert_eq!(l.ptype, "p");
        assert_eq!(l.rule, owned(&["bob", "data1", "read"]));

        let l = parse_policy_line(&encode_rule("p", &["r.sub == \"x\", y", "data1", " read "])).unwrap().unwrap();
        assert_eq!(l.rule, owned(&["r.sub == \"x\", y", "data1", " read "]));
    }

    #[test]
    fn parse_skips_blank_and_comment() {
        assert_eq!(parse_policy_line("   "), Ok(None));
        assert_eq!(parse_policy_line("# p, a, b"), Ok(None));
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(parse_policy_line(", a, b"), Err(LineError::MissingPtype));
        assert_eq!(parse_policy_line("\"\", a"), Err(LineError::MissingPtype));
        assert_eq!(parse_policy_line("p, \"open"), Err(LineError::UnterminatedQuote));
    }

    #[test]
    fn empty_rule_is_distinct_from_one_empty_field() {
        let none: [&str; 0] = [];
        assert_eq!(encode_rule("p", &none), "p");
        assert_eq!(parse_policy_line(&encode_rule("p", &none)).unwrap().unwrap().rule, Vec::<String>::new());
        assert_eq!(encode_rule("p", &[""]), "p, ");
        assert_eq!(parse_policy_line(&encode_rule("p", &[""])).unwrap().unwrap().rule, owned(&[""]));
    }

    #[test]
    fn parse_keeps_empty_middle_fields() {
        let l = parse_policy_line("p, alice, , read").unwrap().unwrap();
        assert_eq!(l.rule, owned(&["alice", "", "read"]));
    }

    #[test]
    fn lenient_skips_and_strict_fails() {
        let mut m = PolicyModel::with_ptypes(&["p"]);
        LenientLineHandler.load_line("g, alice, admin", &mut m).unwrap();
        LenientLineHandler.load_line("p, \"broken", &mut m).unwrap();
        LenientLineHandler.load_line("p, alice, data1, read", &mut m).unwrap();
        assert_eq!(m.policy_count(), 1);

        let err = StrictLineHandler.load_line("g, alice, admin", &mut m).unwrap_err();
        assert_eq!(err.code_str(), "malformed_record");
        assert!(matches!(err, AdapterError::MalformedRecord { source: LineError::UnknownPtype(ref p), .. } if p == "g"));
    }

    #[test]
    fn non_utf8_records_follow_the_handler() {
        let bad: &[u8] = &[b'p', b',', b' ', 0xff, 0xfe];
        let mut m = PolicyModel::with_ptypes(&["p"]);
        load_record(&LenientLineHandler, b"p, alice, data1, read", &mut m).unwrap();
        load_record(&LenientLineHandler, bad, &mut m).unwrap();
        assert_eq!(m.policy_count(), 1);

        let err = load_record(&StrictLineHandler, bad, &mut m).unwrap_err();
        assert!(matches!(err, AdapterError::MalformedRecord { source: LineError::InvalidUtf8, .. }));

        // closures see the lossy text
        let seen = std::cell::RefCell::new(Vec::new());
        let record = |line: &str, _: &mut PolicyModel| -> Result<()> {
            seen.borrow_mut().push(line.to_string());
            Ok(())
        };
        load_record(&record, bad, &mut m).unwrap();
        assert_eq!(seen.into_inner(), vec!["p, \u{fffd}\u{fffd}".to_string()]);
    }

    #[test]
    fn closures_are_handlers() {
        let upper = |line: &str, model: &mut PolicyModel| -> Result<()> {
            LenientLineHandler.load_line(&line.to_uppercase().replacen('P', "p", 1), model)
        };
        let mut m = PolicyModel::with_ptypes(&["p"]);
        upper.load_line("p, alice, data1, read", &mut m).unwrap();
        assert!(m.has_policy("p", "p", &owned(&["ALICE", "DATA1", "READ"])));
    }
}
