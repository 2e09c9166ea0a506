use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::dns::{
    ParseError,
    common::{encode_name, name_to_labels},
    enums::{DNSResourceClass, DNSResourceType},
    resource::DNSResource,
};

use super::fqdn;

/// SOA rdata fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Soa {
    pub mname: String,
    pub rname: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

/// Type-specific payload of a resource record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    NS(String),
    CNAME(String),
    PTR(String),
    MX {
        preference: u16,
        exchange: String,
    },
    TXT(Vec<String>),
    SOA(Soa),
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    CAA {
        flags: u8,
        tag: String,
        value: String,
    },
}

impl RData {
    pub fn rtype(&self) -> DNSResourceType {
        match self {
            RData::A(_) => DNSResourceType::A,
            RData::AAAA(_) => DNSResourceType::AAAA,
            RData::NS(_) => DNSResourceType::NS,
            RData::CNAME(_) => DNSResourceType::CNAME,
            RData::PTR(_) => DNSResourceType::PTR,
            RData::MX { .. } => DNSResourceType::MX,
            RData::TXT(_) => DNSResourceType::TXT,
            RData::SOA(_) => DNSResourceType::SOA,
            RData::SRV { .. } => DNSResourceType::SRV,
            RData::CAA { .. } => DNSResourceType::CAA,
        }
    }

    /// Encode rdata to wire format; names are written uncompressed
    pub fn to_wire(&self) -> Result<Vec<u8>, ParseError> {
        let mut rdata = Vec::new();
        match self {
            RData::A(addr) => rdata.extend_from_slice(&addr.octets()),
            RData::AAAA(addr) => rdata.extend_from_slice(&addr.octets()),
            RData::NS(name) | RData::CNAME(name) | RData::PTR(name) => {
                rdata.extend_from_slice(&encode_name(name)?)
            }
            RData::MX {
                preference,
                exchange,
            } => {
                rdata.extend_from_slice(&preference.to_be_bytes());
                rdata.extend_from_slice(&encode_name(exchange)?);
            }
            RData::TXT(strings) => {
                for text in strings {
                    if text.is_empty() {
                        rdata.push(0);
                    }
                    // Split into 255-byte character-strings
                    for chunk in text.as_bytes().chunks(255) {
                        rdata.push(chunk.len() as u8);
                        rdata.extend_from_slice(chunk);
                    }
                }
            }
            RData::SOA(soa) => {
                rdata.extend_from_slice(&encode_name(&soa.mname)?);
                rdata.extend_from_slice(&encode_name(&soa.rname)?);
                for value in [soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum] {
                    rdata.extend_from_slice(&value.to_be_bytes());
                }
            }
            RData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                rdata.extend_from_slice(&priority.to_be_bytes());
                rdata.extend_from_slice(&weight.to_be_bytes());
                rdata.extend_from_slice(&port.to_be_bytes());
                rdata.extend_from_slice(&encode_name(target)?);
            }
            RData::CAA { flags, tag, value } => {
                if tag.is_empty() || tag.len() > 255 {
                    return Err(ParseError::InvalidAnswerSection);
                }
                rdata.push(*flags);
                rdata.push(tag.len() as u8);
                rdata.extend_from_slice(tag.as_bytes());
                rdata.extend_from_slice(value.as_bytes());
            }
        }
        Ok(rdata)
    }
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RData::A(addr) => write!(f, "{}", addr),
            RData::AAAA(addr) => write!(f, "{}", addr),
            RData::NS(name) | RData::CNAME(name) | RData::PTR(name) => write!(f, "{}", name),
            RData::MX {
                preference,
                exchange,
            } => write!(f, "{} {}", preference, exchange),
            RData::TXT(strings) => {
                let quoted: Vec<String> = strings.iter().map(|s| format!("\"{}\"", s)).collect();
                write!(f, "{}", quoted.join(" "))
            }
            RData::SOA(soa) => write!(
                f,
                "{} {} {} {} {} {} {}",
                soa.mname, soa.rname, soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum
            ),
            RData::SRV {
                priority,
                weight,
                port,
                target,
            } => write!(f, "{} {} {} {}", priority, weight, port, target),
            RData::CAA { flags, tag, value } => write!(f, "{} {} \"{}\"", flags, tag, value),
        }
    }
}

/// A single resource record. Built once by the zone parser and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Owner name, lowercase, fully qualified with trailing dot
    pub name: String,
    pub class: DNSResourceClass,
    pub ttl: u32,
    pub rdata: RData,
}

impl ResourceRecord {
    pub fn new(name: &str, class: DNSResourceClass, ttl: u32, rdata: RData) -> Self {
        Self {
            name: fqdn(name),
            class,
            ttl,
            rdata,
        }
    }

    /// Shorthand for an IN A record
    pub fn a(name: &str, ttl: u32, addr: Ipv4Addr) -> Self {
        Self::new(name, DNSResourceClass::IN, ttl, RData::A(addr))
    }

    pub fn rtype(&self) -> DNSResourceType {
        self.rdata.rtype()
    }

    /// Target of a CNAME record
    pub fn cname_target(&self) -> Option<&str> {
        match &self.rdata {
            RData::CNAME(target) => Some(target),
            _ => None,
        }
    }

    pub fn to_dns_resource(&self) -> Result<DNSResource, ParseError> {
        Ok(DNSResource {
            labels: name_to_labels(&self.name),
            rtype: self.rtype(),
            rclass: self.class,
            ttl: self.ttl,
            rdata: self.rdata.to_wire()?,
        })
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.name,
            self.ttl,
            self.class,
            self.rtype(),
            self.rdata
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a_record_wire_format() {
        let record = ResourceRecord::a("abc.com", 300, Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(record.name, "abc.com.");

        let resource = record.to_dns_resource().unwrap();
        assert_eq!(resource.labels, vec!["abc", "com"]);
        assert_eq!(resource.rdata, vec![127, 0, 0, 1]);
        assert_eq!(resource.ttl, 300);
    }

    #[test]
    fn test_mx_wire_format() {
        let rdata = RData::MX {
            preference: 10,
            exchange: "mail.abc.com.".to_string(),
        };
        let wire = rdata.to_wire().unwrap();
        assert_eq!(&wire[..2], &[0, 10]);
        assert_eq!(wire[2], 4);
        assert_eq!(*wire.last().unwrap(), 0);
    }

    #[test]
    fn test_long_txt_is_chunked() {
        let rdata = RData::TXT(vec!["x".repeat(300)]);
        let wire = rdata.to_wire().unwrap();
        assert_eq!(wire[0], 255);
        assert_eq!(wire[256], 45);
        assert_eq!(wire.len(), 302);
    }

    #[test]
    fn test_display_is_zone_file_like() {
        let record = ResourceRecord::new(
            "www.abc.com.",
            DNSResourceClass::IN,
            300,
            RData::CNAME("abc.com.".to_string()),
        );
        assert_eq!(record.to_string(), "www.abc.com.\t300\tIN\tCNAME\tabc.com.");
    }
}
