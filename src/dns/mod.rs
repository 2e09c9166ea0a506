pub mod common;
pub mod enums;
pub mod header;
pub mod question;
pub mod resource;

use bitstream_io::{BigEndian, BitReader, BitWriter};
use common::PacketComponent;
use enums::{DNSResourceClass, DNSResourceType, ResponseCode};
use header::DNSHeader;
use question::DNSQuestion;
use resource::DNSResource;
use tracing::trace;

/// Largest message we accept or emit over UDP without EDNS
pub const MAX_UDP_PAYLOAD: usize = 512;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub resources: Vec<DNSResource>,
}

#[derive(Debug)]
pub enum ParseError {
    InvalidHeader,
    InvalidLabel,
    NameTooLong,
    InvalidQuestionSection,
    InvalidAnswerSection,
    InvalidAuthoritySection,
    InvalidAdditionalSection,
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::InvalidBitStream(e.to_string())
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidHeader => write!(f, "Invalid DNS header"),
            ParseError::InvalidLabel => write!(f, "Invalid DNS label"),
            ParseError::NameTooLong => write!(f, "DNS name too long"),
            ParseError::InvalidQuestionSection => write!(f, "Invalid question section"),
            ParseError::InvalidAnswerSection => write!(f, "Invalid answer section"),
            ParseError::InvalidAuthoritySection => write!(f, "Invalid authority section"),
            ParseError::InvalidAdditionalSection => write!(f, "Invalid additional section"),
            ParseError::InvalidBitStream(e) => write!(f, "Invalid bit stream: {}", e),
        }
    }
}

impl std::error::Error for ParseError {}

impl DNSPacket {
    /// Build a single-question query, as sent to an upstream resolver
    pub fn query(id: u16, name: &str, qtype: DNSResourceType, recursion_desired: bool) -> Self {
        let mut packet = DNSPacket::default();
        packet.header.id = id;
        packet.header.rd = recursion_desired;
        packet.header.qdcount = 1;
        packet
            .questions
            .push(DNSQuestion::new(name, qtype, DNSResourceClass::IN));
        packet
    }

    /// Start a reply to `query`: id, opcode, RD and the question are echoed
    pub fn reply_to(query: &DNSPacket) -> Self {
        let mut packet = DNSPacket::default();
        packet.header.id = query.header.id;
        packet.header.qr = true;
        packet.header.opcode = query.header.opcode;
        packet.header.rd = query.header.rd;
        packet.header.rcode = ResponseCode::NoError.to_u8();
        packet.questions = query.questions.clone();
        packet
    }

    pub fn rcode(&self) -> Option<ResponseCode> {
        ResponseCode::from_u8(self.header.rcode)
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        trace!("Parsing DNS packet, size: {} bytes", buf.len());
        let mut reader = BitReader::<_, BigEndian>::new(buf);
        let mut packet = DNSPacket::default();
        packet
            .header
            .read(&mut reader, buf)
            .map_err(|_| ParseError::InvalidHeader)?;

        for _ in 0..packet.header.qdcount {
            let mut question = DNSQuestion::default();
            question
                .read(&mut reader, buf)
                .map_err(|e| section_error(e, ParseError::InvalidQuestionSection))?;
            packet.questions.push(question);
        }

        for _ in 0..packet.header.ancount {
            let mut answer = DNSResource::default();
            answer
                .read(&mut reader, buf)
                .map_err(|e| section_error(e, ParseError::InvalidAnswerSection))?;
            packet.answers.push(answer);
        }

        for _ in 0..packet.header.nscount {
            let mut authority = DNSResource::default();
            authority
                .read(&mut reader, buf)
                .map_err(|e| section_error(e, ParseError::InvalidAuthoritySection))?;
            packet.authorities.push(authority);
        }

        for _ in 0..packet.header.arcount {
            let mut resource = DNSResource::default();
            resource
                .read(&mut reader, buf)
                .map_err(|e| section_error(e, ParseError::InvalidAdditionalSection))?;
            packet.resources.push(resource);
        }

        Ok(packet)
    }

    /// Serialize the packet; section counts are taken from the sections
    /// themselves, not from the header fields.
    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = Vec::new();
        let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);

        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.resources.len() as u16;
        header.write(&mut writer)?;

        for question in self.questions.iter() {
            question.write(&mut writer)?;
        }
        for answer in self.answers.iter() {
            answer.write(&mut writer)?;
        }
        for authority in self.authorities.iter() {
            authority.write(&mut writer)?;
        }
        for resource in self.resources.iter() {
            resource.write(&mut writer)?;
        }

        Ok(buf)
    }

    /// Reduce a response to header and question with TC set, for UDP
    /// clients whose reply does not fit in one datagram.
    pub fn truncated(&self) -> Self {
        let mut packet = DNSPacket {
            header: self.header.clone(),
            questions: self.questions.clone(),
            ..Default::default()
        };
        packet.header.tc = true;
        packet
    }
}

fn section_error(e: ParseError, section: ParseError) -> ParseError {
    match e {
        ParseError::InvalidLabel | ParseError::NameTooLong => e,
        _ => section,
    }
}
