//! DNS protocol implementation.
//!
//! This module decodes query messages and builds the A-record responses
//! sent back to clients. It also carries the pieces the upstream resolver
//! needs to build its own query and read the reply.

use std::net::Ipv4Addr;

use crate::errors::DnsError;
use crate::utils::{decode_name, encode_name, labels_to_name, read_u16, read_u32, Label};

/// Length of the fixed DNS header in bytes.
pub const HEADER_LENGTH: usize = 12;

/// TTL written on every synthesized answer.
pub const ANSWER_TTL: u32 = 1;

/// RCODE for a request whose opcode is not a standard query.
pub const RCODE_NOT_IMPLEMENTED: u8 = 4;

/// RCODE for a name that does not exist.
pub const RCODE_NXDOMAIN: u8 = 3;

/// Record type A.
pub const TYPE_A: u16 = 1;

/// Class IN.
pub const CLASS_IN: u16 = 1;

// type + class + ttl + rdlength + IPv4 rdata
const ANSWER_TRAILER_LENGTH: usize = 2 + 2 + 4 + 2 + 4;

/// The fixed 12-byte message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: u8,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    /// Decode the header from the first 12 bytes of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, DnsError> {
        if buf.len() < HEADER_LENGTH {
            return Err(DnsError::malformed(format!(
                "message of {} bytes is shorter than the header",
                buf.len()
            )));
        }

        let flags = read_u16(buf, 2)?;
        Ok(Header {
            id: read_u16(buf, 0)?,
            qr: flags >> 15 == 1,
            opcode: ((flags >> 11) & 0b1111) as u8,
            aa: (flags >> 10) & 1 == 1,
            tc: (flags >> 9) & 1 == 1,
            rd: (flags >> 8) & 1 == 1,
            ra: (flags >> 7) & 1 == 1,
            z: ((flags >> 4) & 0b111) as u8,
            rcode: (flags & 0b1111) as u8,
            qdcount: read_u16(buf, 4)?,
            ancount: read_u16(buf, 6)?,
            nscount: read_u16(buf, 8)?,
            arcount: read_u16(buf, 10)?,
        })
    }

    /// Pack the flag bits into the 16-bit flags word.
    pub fn flags(&self) -> u16 {
        (self.qr as u16) << 15
            | ((self.opcode & 0b1111) as u16) << 11
            | (self.aa as u16) << 10
            | (self.tc as u16) << 9
            | (self.rd as u16) << 8
            | (self.ra as u16) << 7
            | ((self.z & 0b111) as u16) << 4
            | (self.rcode & 0b1111) as u16
    }

    /// Serialize the header in wire order.
    pub fn to_bytes(&self) -> [u8; HEADER_LENGTH] {
        let mut out = [0u8; HEADER_LENGTH];
        out[0..2].copy_from_slice(&self.id.to_be_bytes());
        out[2..4].copy_from_slice(&self.flags().to_be_bytes());
        out[4..6].copy_from_slice(&self.qdcount.to_be_bytes());
        out[6..8].copy_from_slice(&self.ancount.to_be_bytes());
        out[8..10].copy_from_slice(&self.nscount.to_be_bytes());
        out[10..12].copy_from_slice(&self.arcount.to_be_bytes());
        out
    }

    /// The header of the reply to this request.
    ///
    /// Id, opcode, rd, z and the question/authority/additional counts are
    /// carried over. The answer count always equals the question count.
    pub fn response(&self) -> Header {
        Header {
            qr: true,
            aa: false,
            tc: false,
            ra: false,
            rcode: if self.opcode == 0 { 0 } else { RCODE_NOT_IMPLEMENTED },
            ancount: self.qdcount,
            ..*self
        }
    }
}

/// A decoded question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub labels: Vec<Label>,
    pub qtype: u16,
    pub qclass: u16,
}

impl Question {
    /// Sum of label byte lengths, excluding length prefixes and terminator.
    pub fn domain_length(&self) -> usize {
        self.labels.iter().map(Vec::len).sum()
    }

    /// Dotted form of the name.
    pub fn name(&self) -> String {
        labels_to_name(&self.labels)
    }

    /// Bytes needed for this question's answer record.
    pub fn answer_length(&self) -> usize {
        // one length byte per label plus the terminator
        self.domain_length() + self.labels.len() + 1 + ANSWER_TRAILER_LENGTH
    }
}

/// A decoded query message.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    pub header: Header,
    pub questions: Vec<Question>,
    /// The request's question section exactly as received.
    pub question_section: &'a [u8],
}

/// Decode a query message.
///
/// Fails with `MalformedMessage` if the header is truncated, if `qdcount`
/// claims questions the buffer does not hold, or if a name is malformed.
pub fn decode(buf: &[u8]) -> Result<Query<'_>, DnsError> {
    let header = Header::from_bytes(buf)?;
    let (questions, end) = decode_questions(buf, header.qdcount)?;

    Ok(Query {
        header,
        questions,
        question_section: &buf[HEADER_LENGTH..end],
    })
}

/// Decode `count` questions following the header.
///
/// # Returns
/// The questions and the offset just past the question section.
pub fn decode_questions(buf: &[u8], count: u16) -> Result<(Vec<Question>, usize), DnsError> {
    let mut questions = Vec::with_capacity(count.min(32) as usize);
    let mut offset = HEADER_LENGTH;

    for _ in 0..count {
        let (labels, next) = decode_name(buf, offset)?;
        questions.push(Question {
            labels,
            qtype: read_u16(buf, next)?,
            qclass: read_u16(buf, next + 2)?,
        });
        offset = next + 4;
    }

    Ok((questions, offset))
}

/// Encode the reply header for `request`.
pub fn encode_header(request: &Header) -> [u8; HEADER_LENGTH] {
    request.response().to_bytes()
}

/// Append one uncompressed A answer for `question` to `out`.
pub fn encode_answer(
    question: &Question,
    addr: Ipv4Addr,
    out: &mut Vec<u8>,
) -> Result<(), DnsError> {
    let expected = question.answer_length();
    let start = out.len();

    encode_name(&question.labels, out)?;
    out.extend_from_slice(&question.qtype.to_be_bytes());
    out.extend_from_slice(&question.qclass.to_be_bytes());
    out.extend_from_slice(&ANSWER_TTL.to_be_bytes());
    out.extend_from_slice(&4u16.to_be_bytes());
    out.extend_from_slice(&addr.octets());

    let written = out.len() - start;
    if written != expected {
        out.truncate(start);
        return Err(DnsError::EncodingOverflow(format!(
            "answer for {} wrote {} bytes, expected {}",
            question.name(),
            written,
            expected
        )));
    }
    Ok(())
}

/// Encode one answer per question, in question order.
pub fn encode_answers(questions: &[Question], addrs: &[Ipv4Addr]) -> Result<Vec<u8>, DnsError> {
    if questions.len() != addrs.len() {
        return Err(DnsError::EncodingOverflow(format!(
            "{} questions but {} resolved addresses",
            questions.len(),
            addrs.len()
        )));
    }

    let size = questions.iter().map(Question::answer_length).sum();
    let mut out = Vec::with_capacity(size);
    for (question, addr) in questions.iter().zip(addrs) {
        encode_answer(question, *addr, &mut out)?;
    }
    Ok(out)
}

/// Build the full reply: header, echoed question section, answers.
///
/// # Arguments
/// * `query` - The decoded request.
/// * `addrs` - One resolved address per question, in question order.
pub fn build_response(query: &Query<'_>, addrs: &[Ipv4Addr]) -> Result<Vec<u8>, DnsError> {
    let answers = encode_answers(&query.questions, addrs)?;

    let mut response =
        Vec::with_capacity(HEADER_LENGTH + query.question_section.len() + answers.len());
    response.extend_from_slice(&encode_header(&query.header));
    response.extend_from_slice(query.question_section);
    response.extend_from_slice(&answers);
    Ok(response)
}

/// A resource record read from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub labels: Vec<Label>,
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl ResourceRecord {
    /// Decode the record starting at `offset`.
    ///
    /// # Returns
    /// The record and the offset just past its RDATA.
    pub fn decode(buf: &[u8], offset: usize) -> Result<(Self, usize), DnsError> {
        let (labels, pos) = decode_name(buf, offset)?;
        let rtype = read_u16(buf, pos)?;
        let class = read_u16(buf, pos + 2)?;
        let ttl = read_u32(buf, pos + 4)?;
        let rdlength = read_u16(buf, pos + 8)? as usize;

        let start = pos + 10;
        let rdata = buf.get(start..start + rdlength).ok_or_else(|| {
            DnsError::malformed(format!(
                "record at offset {} claims {} bytes of RDATA past end of message",
                offset, rdlength
            ))
        })?;

        Ok((
            ResourceRecord {
                labels,
                rtype,
                class,
                ttl,
                rdata: rdata.to_vec(),
            },
            start + rdlength,
        ))
    }

    /// The address carried by an A record.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        if self.rtype != TYPE_A {
            return None;
        }
        let octets: [u8; 4] = self.rdata.as_slice().try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }
}

/// Build a recursive A query for `labels`.
pub fn build_a_query(id: u16, labels: &[Label]) -> Result<Vec<u8>, DnsError> {
    let header = Header {
        id,
        rd: true,
        qdcount: 1,
        ..Header::default()
    };

    let mut query = Vec::with_capacity(512);
    query.extend_from_slice(&header.to_bytes());
    encode_name(labels, &mut query)?;
    query.extend_from_slice(&TYPE_A.to_be_bytes());
    query.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(query)
}

/// Extract the first A address from an upstream reply to query `id`.
pub fn first_a_record(reply: &[u8], id: u16) -> Result<Ipv4Addr, DnsError> {
    let header = Header::from_bytes(reply)?;
    if header.id != id {
        return Err(DnsError::ResolutionFailure(format!(
            "reply id {} does not match query id {}",
            header.id, id
        )));
    }
    if !header.qr {
        return Err(DnsError::ResolutionFailure("reply is not a response".into()));
    }
    match header.rcode {
        0 => {}
        RCODE_NXDOMAIN => return Err(DnsError::ResolutionFailure("NXDOMAIN".into())),
        rcode => {
            return Err(DnsError::ResolutionFailure(format!(
                "upstream answered with rcode {}",
                rcode
            )))
        }
    }

    let (_, mut offset) = decode_questions(reply, header.qdcount)?;
    for _ in 0..header.ancount {
        let (record, next) = ResourceRecord::decode(reply, offset)?;
        if let Some(addr) = record.ipv4() {
            return Ok(addr);
        }
        offset = next;
    }

    Err(DnsError::ResolutionFailure("no A record in reply".into()))
}
