//! Content identifiers for Bitcoin blocks.
//!
//! A [Cid] binds a double-SHA-256 [Digest] to the kind of block it names. Identifiers are
//! always derived from bytes (or from a Bitcoin hash string) and never mutated.
//!
//! # Format
//!
//! ```text
//! +---------+---------------+-----------+--------+-------------+
//! | version |  codec        | hash alg  | length |   digest    |
//! |  0x01   | varint (2B)   |   0x56    |  0x20  |  32 bytes   |
//! +---------+---------------+-----------+--------+-------------+
//! ```
//!
//! The textual form is the binary form in unpadded lowercase base32 with the multibase
//! prefix `b`. Parsing also accepts lowercase base16 (prefix `f`).

use crate::Error;
use bytes::{Buf, BufMut};
use commonware_codec::{
    varint::UInt, DecodeExt, Encode, EncodeSize, Error as CodecError, FixedSize, Read, ReadExt,
    Write,
};
use ipld_bitcoin_cryptography::dsha256::{self, Digest, DIGEST_LENGTH};
use multibase::Base;
use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

/// CID version.
pub const VERSION: u64 = 1;

/// Multihash code for double-SHA-256.
pub const DBL_SHA2_256: u64 = 0x56;

/// The kind of block a [Cid] names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Codec {
    /// An 80-byte block header.
    Header,
    /// A transaction or a 64-byte transaction merkle node.
    Transaction,
    /// A 64-byte witness commitment.
    WitnessCommitment,
}

impl Codec {
    /// Multicodec code.
    pub const fn code(&self) -> u64 {
        match self {
            Self::Header => 0xb0,
            Self::Transaction => 0xb1,
            Self::WitnessCommitment => 0xb2,
        }
    }

    /// Multicodec name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Header => "bitcoin-block",
            Self::Transaction => "bitcoin-tx",
            Self::WitnessCommitment => "bitcoin-witness-commitment",
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0xb0 => Some(Self::Header),
            0xb1 => Some(Self::Transaction),
            0xb2 => Some(Self::WitnessCommitment),
            _ => None,
        }
    }
}

/// A content identifier: a typed double-SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid {
    codec: Codec,
    digest: Digest,
}

impl Cid {
    pub const fn new(codec: Codec, digest: Digest) -> Self {
        Self { codec, digest }
    }

    /// Hash `bytes` and tag the digest with `codec`.
    pub fn for_bytes(codec: Codec, bytes: &[u8]) -> Self {
        Self::new(codec, dsha256::hash(bytes))
    }

    /// Parse a hex hash string into a [Cid].
    ///
    /// Bitcoin presents block and transaction identifiers big-endian while digests are stored
    /// in internal (little-endian) order, so `reverse` should be set for such identifiers.
    pub fn from_hash_hex(codec: Codec, value: &str, reverse: bool) -> Result<Self, Error> {
        let digest = Digest::from_hash_hex(value, reverse)
            .map_err(|_| Error::InvalidHashFormat(value.to_string()))?;
        Ok(Self::new(codec, digest))
    }

    /// Render the digest as a big-endian hex hash string, the inverse of
    /// [Cid::from_hash_hex] with `reverse` set. The codec is not part of the output.
    pub fn to_hash_hex(&self) -> String {
        self.digest.to_hash_hex()
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }
}

/// Reads a varint, rejecting encodings longer than necessary.
fn read_varint(buf: &mut impl Buf) -> Result<u64, CodecError> {
    let remaining = buf.remaining();
    let value: u64 = UInt::read(buf)?.into();
    if remaining - buf.remaining() != UInt(value).encode_size() {
        return Err(CodecError::Invalid("Cid", "non-minimal varint"));
    }
    Ok(value)
}

impl Write for Cid {
    fn write(&self, buf: &mut impl BufMut) {
        UInt(VERSION).write(buf);
        UInt(self.codec.code()).write(buf);
        UInt(DBL_SHA2_256).write(buf);
        UInt(DIGEST_LENGTH as u64).write(buf);
        self.digest.write(buf);
    }
}

impl Read for Cid {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        if read_varint(buf)? != VERSION {
            return Err(CodecError::Invalid("Cid", "unsupported version"));
        }
        let codec = Codec::from_code(read_varint(buf)?)
            .ok_or(CodecError::Invalid("Cid", "unknown codec"))?;
        if read_varint(buf)? != DBL_SHA2_256 {
            return Err(CodecError::Invalid("Cid", "unsupported hash algorithm"));
        }
        if read_varint(buf)? != DIGEST_LENGTH as u64 {
            return Err(CodecError::Invalid("Cid", "invalid digest length"));
        }
        let digest = Digest::read(buf)?;
        Ok(Self::new(codec, digest))
    }
}

// Version, two-byte codec code, hash algorithm, digest length, digest
impl FixedSize for Cid {
    const SIZE: usize = 1 + 2 + 1 + 1 + DIGEST_LENGTH;
}

impl Display for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", multibase::encode(Base::Base32Lower, self.encode()))
    }
}

impl Debug for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.codec.name(), self.digest)
    }
}

impl FromStr for Cid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, bytes) =
            multibase::decode(s).map_err(|_| Error::InvalidCid("invalid multibase"))?;
        match base {
            Base::Base32Lower | Base::Base16Lower => Ok(Self::decode(bytes.as_slice())?),
            _ => Err(Error::InvalidCid("unsupported multibase")),
        }
    }
}

/// Convert a big-endian Bitcoin block hash to the [Cid] of its header.
pub fn block_hash_to_cid(hash: &str) -> Result<Cid, Error> {
    Cid::from_hash_hex(Codec::Header, hash, true)
}

/// Convert a big-endian Bitcoin transaction hash to a [Cid].
pub fn tx_hash_to_cid(hash: &str) -> Result<Cid, Error> {
    Cid::from_hash_hex(Codec::Transaction, hash, true)
}

/// Convert any [Cid] back to its big-endian Bitcoin hash string.
pub fn cid_to_hash(cid: &Cid) -> String {
    cid.to_hash_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const GENESIS_HASH: &str = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
    const GENESIS_TX_HASH: &str =
        "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    const GENESIS_HEADER_CID: &str =
        "bagyacvran7riycvw6gzxfqngujdk4y7xj6jr5a3f4fnarhdi2ymqaaaaaaaa";
    const GENESIS_TX_CID: &str = "bagyqcvrahor637l2pmjle6whfq7go5upmf74qg6drcffcmr2t64kusy6lzfa";

    #[test]
    fn test_binary_layout() {
        let cid = block_hash_to_cid(GENESIS_HASH).unwrap();
        let encoded = cid.encode();
        assert_eq!(encoded.len(), Cid::SIZE);
        assert_eq!(&encoded[..5], &[0x01, 0xb0, 0x01, 0x56, 0x20]);
        assert_eq!(&encoded[5..], cid.digest().as_ref());

        // Internal byte order is the reverse of the displayed hash
        assert_eq!(encoded[5 + 31], 0x00);
        assert_eq!(encoded[5], 0x6f);
    }

    #[test_case(Codec::Header; "header")]
    #[test_case(Codec::Transaction; "transaction")]
    #[test_case(Codec::WitnessCommitment; "witness commitment")]
    fn test_codec_roundtrip(codec: Codec) {
        let cid = Cid::for_bytes(codec, b"block");
        assert_eq!(cid.encode_size(), Cid::SIZE);
        assert_eq!(
            Cid::SIZE,
            UInt(VERSION).encode_size()
                + UInt(codec.code()).encode_size()
                + UInt(DBL_SHA2_256).encode_size()
                + UInt(DIGEST_LENGTH as u64).encode_size()
                + DIGEST_LENGTH
        );
        let decoded = Cid::decode(cid.encode()).unwrap();
        assert_eq!(decoded, cid);
        assert_eq!(decoded.codec(), codec);
        assert_eq!(Codec::from_code(codec.code()), Some(codec));
    }

    #[test]
    fn test_genesis_strings() {
        let header = block_hash_to_cid(GENESIS_HASH).unwrap();
        assert_eq!(header.to_string(), GENESIS_HEADER_CID);
        assert_eq!(GENESIS_HEADER_CID.parse::<Cid>().unwrap(), header);

        let tx = tx_hash_to_cid(GENESIS_TX_HASH).unwrap();
        assert_eq!(tx.to_string(), GENESIS_TX_CID);
        assert_eq!(GENESIS_TX_CID.parse::<Cid>().unwrap(), tx);
    }

    #[test]
    fn test_parse_base16() {
        let cid = block_hash_to_cid(GENESIS_HASH).unwrap();
        let text = format!("f{}", hex::encode(cid.encode()));
        assert!(text.starts_with("f01b0015620"));
        assert_eq!(text.parse::<Cid>().unwrap(), cid);
    }

    #[test]
    fn test_hash_conversions() {
        let block = block_hash_to_cid(GENESIS_HASH).unwrap();
        let tx = tx_hash_to_cid(GENESIS_HASH).unwrap();
        assert_ne!(block, tx);
        assert_eq!(block.digest(), tx.digest());
        assert_eq!(cid_to_hash(&block), GENESIS_HASH);
        assert_eq!(cid_to_hash(&tx), GENESIS_HASH);

        let forward = Cid::from_hash_hex(Codec::Header, GENESIS_HASH, false).unwrap();
        assert_eq!(hex::encode(forward.digest()), GENESIS_HASH);
    }

    #[test_case(""; "empty")]
    #[test_case("00"; "short")]
    #[test_case("zz"; "not hex")]
    #[test_case("000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f00"; "long")]
    fn test_invalid_hash_format(value: &str) {
        assert!(matches!(
            block_hash_to_cid(value),
            Err(Error::InvalidHashFormat(_))
        ));
    }

    #[test_case(Base::Base58Btc; "base58")]
    #[test_case(Base::Base32Upper; "base32 upper")]
    #[test_case(Base::Base64; "base64")]
    fn test_unsupported_multibase(base: Base) {
        let cid = tx_hash_to_cid(GENESIS_TX_HASH).unwrap();
        let text = multibase::encode(base, cid.encode());
        assert!(matches!(
            text.parse::<Cid>(),
            Err(Error::InvalidCid("unsupported multibase"))
        ));
    }

    #[test]
    fn test_invalid_strings() {
        assert!(matches!(
            "".parse::<Cid>(),
            Err(Error::InvalidCid("invalid multibase"))
        ));
        assert!(matches!(
            "b!!!!".parse::<Cid>(),
            Err(Error::InvalidCid("invalid multibase"))
        ));
    }

    fn mutated(edit: impl FnOnce(&mut Vec<u8>)) -> String {
        let cid = tx_hash_to_cid(GENESIS_TX_HASH).unwrap();
        let mut bytes = cid.encode().to_vec();
        edit(&mut bytes);
        multibase::encode(Base::Base32Lower, bytes)
    }

    #[test]
    fn test_invalid_binary() {
        // Unknown codec
        let unknown = mutated(|bytes| bytes[1] = 0xb3);
        assert!(matches!(
            unknown.parse::<Cid>(),
            Err(Error::Codec(CodecError::Invalid("Cid", "unknown codec")))
        ));

        // Wrong hash algorithm (sha2-256)
        let sha256 = mutated(|bytes| bytes[3] = 0x12);
        assert!(matches!(
            sha256.parse::<Cid>(),
            Err(Error::Codec(CodecError::Invalid(
                "Cid",
                "unsupported hash algorithm"
            )))
        ));

        // Wrong version
        let version = mutated(|bytes| bytes[0] = 0x00);
        assert!(matches!(
            version.parse::<Cid>(),
            Err(Error::Codec(CodecError::Invalid("Cid", "unsupported version")))
        ));

        // Version padded with a redundant continuation byte
        let padded = mutated(|bytes| {
            bytes[0] = 0x81;
            bytes.insert(1, 0x00);
        });
        assert!(padded.parse::<Cid>().is_err());

        // Truncated and extended
        let truncated = mutated(|bytes| {
            bytes.pop();
        });
        assert!(matches!(
            truncated.parse::<Cid>(),
            Err(Error::Codec(CodecError::EndOfBuffer))
        ));
        let extended = mutated(|bytes| bytes.push(0));
        assert!(matches!(
            extended.parse::<Cid>(),
            Err(Error::Codec(CodecError::ExtraData(1)))
        ));
    }
}
