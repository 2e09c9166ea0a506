use super::{RData, ResourceRecord, Result, Soa, ZoneError, constants, fqdn};
use crate::dns::common::{MAX_LABEL_LENGTH, MAX_NAME_LENGTH};
use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::{debug, trace};

/// RFC 1035 master-file parser.
///
/// Produces records in source order. Owner names and names inside rdata are
/// expanded against the current origin, so every record leaves the parser
/// fully qualified.
pub struct ZoneParser {
    /// Zone being parsed, for error reporting
    zone: String,
    /// Current origin for relative names
    current_origin: String,
    /// Value of the last `$TTL` directive
    default_ttl: Option<u32>,
    /// Last TTL written explicitly on a record
    last_ttl: Option<u32>,
    /// Owner of the previous record, inherited by indented lines
    last_owner: Option<String>,
    /// Line number for error reporting
    line_number: usize,
}

impl ZoneParser {
    /// Create a parser whose initial origin is `origin`
    pub fn new(origin: &str) -> Self {
        let origin = fqdn(origin);
        Self {
            zone: origin.clone(),
            current_origin: origin,
            default_ttl: None,
            last_ttl: None,
            last_owner: None,
            line_number: 0,
        }
    }

    /// Parse zone file contents into records
    pub fn parse(&mut self, contents: &str) -> Result<Vec<ResourceRecord>> {
        self.line_number = 0;
        self.current_origin = self.zone.clone();
        self.default_ttl = None;
        self.last_ttl = None;
        self.last_owner = None;

        let mut records = Vec::new();
        let mut entry = String::new();
        let mut depth = 0i32;
        let mut entry_line = 0;

        for line in contents.lines() {
            self.line_number += 1;
            let line = strip_comment(line);

            if depth == 0 {
                if line.trim().is_empty() {
                    continue;
                }
                entry_line = self.line_number;
                entry.clear();
                entry.push_str(line);
            } else {
                entry.push(' ');
                entry.push_str(line);
            }

            depth += paren_balance(line);
            if depth < 0 {
                return Err(self.syntax(self.line_number, "unbalanced ')'"));
            }
            if depth > 0 {
                continue;
            }

            trace!("Parsing entry at line {}: {}", entry_line, entry);
            if entry.trim_start().starts_with('$') {
                self.parse_directive(&entry, entry_line)?;
            } else {
                let record = self.parse_record(&entry, entry_line)?;
                records.push(record);
            }
        }

        if depth > 0 {
            return Err(self.syntax(
                entry_line,
                "unclosed parentheses at end of zone",
            ));
        }

        debug!("Parsed zone {} with {} records", self.zone, records.len());
        Ok(records)
    }

    fn parse_directive(&mut self, entry: &str, line: usize) -> Result<()> {
        let parts = tokenize(entry).map_err(|msg| self.syntax(line, &msg))?;
        if parts.is_empty() {
            return Ok(());
        }

        match parts[0].to_ascii_uppercase().as_str() {
            "$ORIGIN" => {
                let name = parts
                    .get(1)
                    .ok_or_else(|| self.syntax(line, "$ORIGIN requires a domain name"))?;
                self.current_origin = self.absolute(name, line)?;
                debug!("Set origin to: {}", self.current_origin);
            }
            "$TTL" => {
                let value = parts
                    .get(1)
                    .ok_or_else(|| self.syntax(line, "$TTL requires a value"))?;
                let ttl = parse_ttl(value)
                    .ok_or_else(|| self.syntax(line, &format!("invalid TTL: {}", value)))?;
                self.default_ttl = Some(ttl);
                debug!("Set default TTL to: {}", ttl);
            }
            "$INCLUDE" => {
                return Err(self.syntax(line, "$INCLUDE is not supported for remote zones"));
            }
            other => {
                debug!("Ignoring unknown directive {} in zone {}", other, self.zone);
            }
        }

        Ok(())
    }

    fn parse_record(&mut self, entry: &str, line: usize) -> Result<ResourceRecord> {
        let parts = tokenize(entry).map_err(|msg| self.syntax(line, &msg))?;
        if parts.is_empty() {
            return Err(self.syntax(line, "empty record"));
        }

        let mut idx = 0;
        let owner = if entry.starts_with(' ') || entry.starts_with('\t') {
            self.last_owner
                .clone()
                .ok_or_else(|| self.syntax(line, "record has no owner and no previous owner"))?
        } else {
            idx += 1;
            self.absolute(&parts[0], line)?
        };

        let mut ttl = None;
        let mut class = None;
        let mut rtype = None;

        // TTL and class are optional and may come in either order
        while idx < parts.len() {
            let field = &parts[idx];
            idx += 1;

            if ttl.is_none() {
                if let Some(value) = parse_ttl(field) {
                    ttl = Some(value);
                    continue;
                }
            }
            if class.is_none() {
                if let Ok(parsed) = field.parse::<DNSResourceClass>() {
                    class = Some(parsed);
                    continue;
                }
            }
            match field.parse::<DNSResourceType>() {
                Ok(parsed) => {
                    rtype = Some(parsed);
                    break;
                }
                Err(msg) => return Err(self.syntax(line, &msg)),
            }
        }

        let rtype = rtype.ok_or_else(|| self.syntax(line, "missing record type"))?;
        let rdata_parts = &parts[idx..];
        if rdata_parts.is_empty() {
            return Err(self.syntax(line, "missing RDATA"));
        }

        if ttl.is_some() {
            self.last_ttl = ttl;
        }
        let ttl = ttl
            .or(self.default_ttl)
            .or(self.last_ttl)
            .unwrap_or(constants::DEFAULT_TTL);
        let rdata = self.parse_rdata(rtype, rdata_parts, line)?;

        self.last_owner = Some(owner.clone());
        Ok(ResourceRecord {
            name: owner,
            class: class.unwrap_or(DNSResourceClass::IN),
            ttl,
            rdata,
        })
    }

    fn parse_rdata(&self, rtype: DNSResourceType, parts: &[String], line: usize) -> Result<RData> {
        let expect = |count: usize| -> Result<()> {
            if parts.len() != count {
                return Err(self.syntax(
                    line,
                    &format!("{} record requires {} fields, got {}", rtype, count, parts.len()),
                ));
            }
            Ok(())
        };

        let rdata = match rtype {
            DNSResourceType::A => {
                expect(1)?;
                let addr: Ipv4Addr = parts[0].parse().map_err(|_| {
                    self.syntax(line, &format!("invalid IPv4 address: {}", parts[0]))
                })?;
                RData::A(addr)
            }
            DNSResourceType::AAAA => {
                expect(1)?;
                let addr: Ipv6Addr = parts[0].parse().map_err(|_| {
                    self.syntax(line, &format!("invalid IPv6 address: {}", parts[0]))
                })?;
                RData::AAAA(addr)
            }
            DNSResourceType::NS => {
                expect(1)?;
                RData::NS(self.absolute(&parts[0], line)?)
            }
            DNSResourceType::CNAME => {
                expect(1)?;
                RData::CNAME(self.absolute(&parts[0], line)?)
            }
            DNSResourceType::PTR => {
                expect(1)?;
                RData::PTR(self.absolute(&parts[0], line)?)
            }
            DNSResourceType::MX => {
                expect(2)?;
                RData::MX {
                    preference: self.number(&parts[0], line)?,
                    exchange: self.absolute(&parts[1], line)?,
                }
            }
            DNSResourceType::TXT => RData::TXT(parts.to_vec()),
            DNSResourceType::SOA => {
                expect(7)?;
                let timer = |s: &String| {
                    parse_ttl(s).ok_or_else(|| {
                        self.syntax(line, &format!("invalid SOA timer value: {}", s))
                    })
                };
                RData::SOA(Soa {
                    mname: self.absolute(&parts[0], line)?,
                    rname: self.absolute(&parts[1], line)?,
                    serial: self.number(&parts[2], line)?,
                    refresh: timer(&parts[3])?,
                    retry: timer(&parts[4])?,
                    expire: timer(&parts[5])?,
                    minimum: timer(&parts[6])?,
                })
            }
            DNSResourceType::SRV => {
                expect(4)?;
                RData::SRV {
                    priority: self.number(&parts[0], line)?,
                    weight: self.number(&parts[1], line)?,
                    port: self.number(&parts[2], line)?,
                    target: self.absolute(&parts[3], line)?,
                }
            }
            DNSResourceType::CAA => {
                expect(3)?;
                RData::CAA {
                    flags: self.number(&parts[0], line)?,
                    tag: parts[1].clone(),
                    value: parts[2].clone(),
                }
            }
            other => {
                return Err(self.syntax(
                    line,
                    &format!("unsupported record type in zone file: {}", other),
                ));
            }
        };

        Ok(rdata)
    }

    /// Expand a possibly relative name against the current origin
    fn absolute(&self, name: &str, line: usize) -> Result<String> {
        let expanded = if name == "@" {
            self.current_origin.clone()
        } else if name.ends_with('.') {
            fqdn(name)
        } else if self.current_origin == "." {
            fqdn(name)
        } else {
            fqdn(&format!("{}.{}", name, self.current_origin))
        };

        let wire_len: usize = expanded
            .split('.')
            .filter(|l| !l.is_empty())
            .map(|l| l.len() + 1)
            .sum::<usize>()
            + 1;
        let label_too_long = expanded.split('.').any(|l| l.len() > MAX_LABEL_LENGTH);
        if wire_len > MAX_NAME_LENGTH || label_too_long || expanded.contains("..") {
            return Err(self.syntax(
                line,
                &ZoneError::InvalidDomainName(name.to_string()).to_string(),
            ));
        }

        Ok(expanded)
    }

    fn number<T: std::str::FromStr>(&self, s: &str, line: usize) -> Result<T> {
        s.parse::<T>()
            .map_err(|_| self.syntax(line, &format!("invalid number: {}", s)))
    }

    fn syntax(&self, line: usize, message: &str) -> ZoneError {
        ZoneError::Syntax {
            zone: self.zone.clone(),
            line,
            message: message.to_string(),
        }
    }
}

/// Parse a TTL, allowing unit suffixes (`1h30m`, `2d`, `300`)
fn parse_ttl(s: &str) -> Option<u32> {
    if !s.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let mut total: u64 = 0;
    let mut current: u64 = 0;
    let mut pending_digits = false;

    for ch in s.chars() {
        if let Some(digit) = ch.to_digit(10) {
            current = current.checked_mul(10)?.checked_add(digit as u64)?;
            pending_digits = true;
            continue;
        }
        let unit = match ch.to_ascii_lowercase() {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86400,
            'w' => 604800,
            _ => return None,
        };
        if !pending_digits {
            return None;
        }
        total = total.checked_add(current.checked_mul(unit)?)?;
        current = 0;
        pending_digits = false;
    }
    total = total.checked_add(current)?;

    u32::try_from(total).ok()
}

/// Drop a `;` comment, ignoring semicolons inside quoted strings
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut escaped = false;
    for (pos, ch) in line.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &line[..pos],
            _ => {}
        }
    }
    line
}

/// Net count of '(' minus ')' outside quoted strings
fn paren_balance(line: &str) -> i32 {
    let mut in_quotes = false;
    let mut escaped = false;
    let mut balance = 0;
    for ch in line.chars() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => balance += 1,
            ')' if !in_quotes => balance -= 1,
            _ => {}
        }
    }
    balance
}

/// Split an entry into fields, honouring quotes and dropping parentheses
fn tokenize(entry: &str) -> std::result::Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut chars = entry.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| "dangling escape at end of line".to_string())?;
                current.push(escaped);
                in_token = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            ' ' | '\t' | '(' | ')' if !in_quotes => {
                if in_token {
                    parts.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            _ => {
                current.push(ch);
                in_token = true;
            }
        }
    }

    if in_quotes {
        return Err("unterminated quoted string".to_string());
    }
    if in_token {
        parts.push(current);
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC_ZONE: &str = "$TTL    300
$ORIGIN .
abc.com \t86400    IN      SOA     nsa.abc.com. admin.abc.com. ( 2014121700 10800 1200 864000 7200 )
        \tIN      NS      nsa.abc.com.
        \tIN      NS      nsb.abc.com.
        \tIN      MX\t10 mail.abc.com.
$ORIGIN abc.com.
\t\tIN\tA\t127.0.0.1
www\t\tIN\tCNAME\tabc.com.
";

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("300"), Some(300));
        assert_eq!(parse_ttl("5m"), Some(300));
        assert_eq!(parse_ttl("1h"), Some(3600));
        assert_eq!(parse_ttl("1d"), Some(86400));
        assert_eq!(parse_ttl("1w"), Some(604800));
        assert_eq!(parse_ttl("1h30m"), Some(5400));
        assert_eq!(parse_ttl("IN"), None);
        assert_eq!(parse_ttl("10x"), None);
        assert_eq!(parse_ttl("99999999999"), None);
        assert_eq!(parse_ttl("99999999999999w"), None);
        assert_eq!(parse_ttl("18446744073709551615s1s"), None);
    }

    #[test]
    fn test_origin_and_owner_inheritance() {
        let records = ZoneParser::new("abc.com").parse(ABC_ZONE).unwrap();
        assert_eq!(records.len(), 6);

        assert_eq!(records[0].name, "abc.com.");
        assert_eq!(records[0].ttl, 86400);
        assert!(matches!(&records[0].rdata, RData::SOA(soa) if soa.serial == 2014121700 && soa.minimum == 7200));

        // Indented lines inherit the previous owner and the $TTL default
        assert_eq!(records[1].name, "abc.com.");
        assert_eq!(records[1].ttl, 300);
        assert_eq!(records[4].name, "abc.com.");
        assert_eq!(records[4].rdata, RData::A(Ipv4Addr::new(127, 0, 0, 1)));

        assert_eq!(records[5].name, "www.abc.com.");
        assert_eq!(records[5].rdata, RData::CNAME("abc.com.".to_string()));
    }

    #[test]
    fn test_relative_names_in_rdata() {
        let zone = "$ORIGIN example.com.\n@ 3600 IN MX 10 mail\nmail IN A 192.0.2.3\n";
        let records = ZoneParser::new("example.com").parse(zone).unwrap();
        assert_eq!(
            records[0].rdata,
            RData::MX {
                preference: 10,
                exchange: "mail.example.com.".to_string()
            }
        );
        assert_eq!(records[1].name, "mail.example.com.");
        // No $TTL: falls back to the last explicit TTL
        assert_eq!(records[1].ttl, 3600);
    }

    #[test]
    fn test_multiline_soa() {
        let zone = "@ IN SOA ns1 admin (\n  2024010101 ; serial\n  1h 15m 1w\n  1d )\n";
        let records = ZoneParser::new("example.com.").parse(zone).unwrap();
        assert_eq!(records.len(), 1);
        match &records[0].rdata {
            RData::SOA(soa) => {
                assert_eq!(soa.mname, "ns1.example.com.");
                assert_eq!(soa.refresh, 3600);
                assert_eq!(soa.expire, 604800);
                assert_eq!(soa.minimum, 86400);
            }
            other => panic!("expected SOA, got {:?}", other),
        }
    }

    #[test]
    fn test_txt_quoting() {
        let zone = "@ IN TXT \"v=spf1 -all; strict\" \"second\"\n";
        let records = ZoneParser::new("example.com.").parse(zone).unwrap();
        assert_eq!(
            records[0].rdata,
            RData::TXT(vec!["v=spf1 -all; strict".to_string(), "second".to_string()])
        );
    }

    #[test]
    fn test_syntax_errors_carry_line_numbers() {
        let zone = "@ IN A 127.0.0.1\nwww IN A not-an-address\n";
        let err = ZoneParser::new("example.com").parse(zone).unwrap_err();
        match err {
            ZoneError::Syntax { zone, line, .. } => {
                assert_eq!(zone, "example.com.");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut parser = ZoneParser::new("example.com");
        assert!(parser.parse("@ IN SOA ns1 admin ( 1 2 3 4\n").is_err());
        assert!(parser.parse("@ IN BOGUS data\n").is_err());
        assert!(parser.parse("  IN A 127.0.0.1\n").is_err());
        assert!(parser.parse("$INCLUDE other.zone\n").is_err());
        assert!(parser.parse("@ IN TXT \"unterminated\n").is_err());
        assert!(parser.parse("@ IN A\n").is_err());
        assert!(matches!(
            parser.parse("@ 99999999999999w IN A 127.0.0.1\n"),
            Err(ZoneError::Syntax { line: 1, .. })
        ));
    }
}
