//! JSON-RPC adapter for the lottery contract.
//!
//! Point reads go through `eth_call` against the contract's public
//! getters; the watcher fetches raw logs with `eth_getLogs` filtered by
//! event topic. Every event carries its payload as non-indexed data, so
//! decoding is a matter of slicing 32-byte words.

use super::{LotterySource, SourceError};
use crate::events::{
    ChainEvent, EventKind, LotteryCreated, LotteryDrawn, LotteryExpired, ProfitWithdrawn,
    TicketPurchased, Withdrawal,
};
use alloy_primitives::{Address, B256, U256, hex, keccak256};
use async_trait::async_trait;
use lazy_static::lazy_static;
use olst_sdk::objects::lottery::{LotterySnapshot, OnChainStatus};
use serde::Deserialize;
use url::Url;

const WORD: usize = 32;

lazy_static! {
    static ref EVENT_TOPICS: Vec<(EventKind, B256)> = EventKind::ALL
        .iter()
        .map(|kind| (*kind, keccak256(event_signature(*kind).as_bytes())))
        .collect();
    static ref LOTTERIES_SELECTOR: [u8; 4] = selector("lotteries(uint256)");
    static ref LOTTERY_COUNT_SELECTOR: [u8; 4] = selector("lotteryCount()");
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn event_signature(kind: EventKind) -> &'static str {
    match kind {
        EventKind::LotteryCreated => "LotteryCreated(uint256,address,uint256,uint256,uint256)",
        EventKind::TicketPurchased => "TicketPurchased(uint256,address,uint256,uint256)",
        EventKind::LotteryDrawn => "LotteryDrawn(uint256,address,uint256,uint256)",
        EventKind::LotteryExpired => "LotteryExpired(uint256)",
        EventKind::Withdrawal => "Withdrawal(address)",
        EventKind::ProfitWithdrawn => "ProfitWithdrawn(address)",
    }
}

/// The `topic0` identifying one event kind in a log filter.
pub fn topic0(kind: EventKind) -> B256 {
    EVENT_TOPICS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, topic)| *topic)
        .unwrap_or_default()
}

/// A fetched log, reduced to what decoding needs.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub block_number: u64,
    pub data: Vec<u8>,
}

/// Errors from decoding one log into a [`ChainEvent`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("log data too short: expected {expected} words, got {got}")]
    ShortData { expected: usize, got: usize },

    #[error("word {index} does not fit the target type")]
    WordOverflow { index: usize },
}

/// Decode a raw log of a known kind into a typed event.
///
/// A failure here is the "malformed input" case of the pipeline: the
/// caller logs and drops the log without blocking the subscription.
pub fn decode_event(kind: EventKind, log: &RawLog) -> Result<ChainEvent, DecodeError> {
    let mut words = WordReader::new(&log.data);
    let event = match kind {
        EventKind::LotteryCreated => {
            words.expect(5)?;
            ChainEvent::Created(LotteryCreated {
                id: words.u64()?,
                creator: words.address()?,
                ticket_price: words.u256()?,
                prize_amount: words.u256()?,
                buy_deadline: words.i64()?,
            })
        }
        EventKind::TicketPurchased => {
            words.expect(4)?;
            ChainEvent::TicketPurchased(TicketPurchased {
                id: words.u64()?,
                buyer: words.address()?,
                new_tickets_sold: words.u64()?,
                new_pot: words.u256()?,
            })
        }
        EventKind::LotteryDrawn => {
            words.expect(4)?;
            ChainEvent::Drawn(LotteryDrawn {
                id: words.u64()?,
                winner: words.address()?,
                payout_winner: words.u256()?,
                total_profit: words.u256()?,
            })
        }
        EventKind::LotteryExpired => {
            words.expect(1)?;
            ChainEvent::Expired(LotteryExpired { id: words.u64()? })
        }
        EventKind::Withdrawal => {
            words.expect(1)?;
            ChainEvent::Withdrawal(Withdrawal {
                user: words.address()?,
            })
        }
        EventKind::ProfitWithdrawn => {
            words.expect(1)?;
            ChainEvent::ProfitWithdrawn(ProfitWithdrawn {
                creator: words.address()?,
            })
        }
    };
    Ok(event)
}

fn as_parse_error(e: DecodeError) -> SourceError {
    SourceError::Parse(e.to_string())
}

/// Sequential 32-byte word reader over ABI-encoded data.
struct WordReader<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> WordReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    fn expect(&self, words: usize) -> Result<(), DecodeError> {
        let got = self.data.len() / WORD;
        if got < words {
            return Err(DecodeError::ShortData {
                expected: words,
                got,
            });
        }
        Ok(())
    }

    fn next_word(&mut self) -> Result<&'a [u8], DecodeError> {
        let start = self.index * WORD;
        let end = start + WORD;
        if end > self.data.len() {
            return Err(DecodeError::ShortData {
                expected: self.index + 1,
                got: self.data.len() / WORD,
            });
        }
        self.index += 1;
        Ok(&self.data[start..end])
    }

    fn u256(&mut self) -> Result<U256, DecodeError> {
        Ok(U256::from_be_slice(self.next_word()?))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let index = self.index;
        u64::try_from(self.u256()?).map_err(|_| DecodeError::WordOverflow { index })
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        let index = self.index;
        i64::try_from(self.u256()?).map_err(|_| DecodeError::WordOverflow { index })
    }

    fn address(&mut self) -> Result<Address, DecodeError> {
        let word = self.next_word()?;
        Ok(Address::from_slice(&word[12..]))
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogEntry {
    block_number: String,
    data: String,
}

/// [`LotterySource`] backed by a JSON-RPC node.
pub struct RpcLotterySource {
    http: reqwest::Client,
    rpc_url: Url,
    contract: Address,
}

impl RpcLotterySource {
    pub fn new(rpc_url: Url, contract: Address) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            rpc_url,
            contract,
        })
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, SourceError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response: RpcResponse = self
            .http
            .post(self.rpc_url.clone())
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(SourceError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| SourceError::Parse("missing result".into()))
    }

    async fn eth_call(&self, calldata: Vec<u8>) -> Result<Vec<u8>, SourceError> {
        let params = serde_json::json!([
            { "to": self.contract, "data": format!("0x{}", hex::encode(calldata)) },
            "latest",
        ]);
        let result = self.call("eth_call", params).await?;
        let result = result
            .as_str()
            .ok_or_else(|| SourceError::Parse("eth_call result is not a string".into()))?;
        hex::decode(result).map_err(|e| SourceError::Parse(format!("invalid call result: {e}")))
    }

    /// Fetch logs of one event kind starting at `from_block`.
    pub async fn fetch_logs(
        &self,
        kind: EventKind,
        from_block: u64,
    ) -> Result<Vec<RawLog>, SourceError> {
        let params = serde_json::json!([{
            "address": self.contract,
            "topics": [topic0(kind)],
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": "latest",
        }]);
        let result = self.call("eth_getLogs", params).await?;
        let entries: Vec<LogEntry> = serde_json::from_value(result)
            .map_err(|e| SourceError::Parse(format!("invalid log list: {e}")))?;

        entries
            .into_iter()
            .map(|entry| {
                let block_number =
                    u64::from_str_radix(entry.block_number.trim_start_matches("0x"), 16)
                        .map_err(|e| SourceError::Parse(format!("invalid block number: {e}")))?;
                let data = hex::decode(&entry.data)
                    .map_err(|e| SourceError::Parse(format!("invalid log data: {e}")))?;
                Ok(RawLog { block_number, data })
            })
            .collect()
    }
}

#[async_trait]
impl LotterySource for RpcLotterySource {
    async fn lottery(&self, id: u64) -> Result<LotterySnapshot, SourceError> {
        let mut calldata = LOTTERIES_SELECTOR.to_vec();
        calldata.extend_from_slice(&U256::from(id).to_be_bytes::<32>());
        let data = self.eth_call(calldata).await?;

        let mut words = WordReader::new(&data);
        words.expect(8).map_err(as_parse_error)?;

        let creator = words.address().map_err(as_parse_error)?;
        let ticket_price = words.u256().map_err(as_parse_error)?;
        let prize_amount = words.u256().map_err(as_parse_error)?;
        let buy_deadline = words.i64().map_err(as_parse_error)?;
        let status_raw = words.u64().map_err(as_parse_error)?;
        let tickets_sold = words.u64().map_err(as_parse_error)?;
        let pot = words.u256().map_err(as_parse_error)?;
        let winner = words.address().map_err(as_parse_error)?;

        // An id past the end of contract storage reads as all zeroes.
        if creator == Address::ZERO {
            return Err(SourceError::NotFound(id));
        }

        let status = u8::try_from(status_raw)
            .ok()
            .and_then(OnChainStatus::from_chain)
            .ok_or_else(|| SourceError::Parse(format!("invalid status value {status_raw}")))?;

        Ok(LotterySnapshot {
            id,
            creator,
            ticket_price,
            prize_amount,
            buy_deadline,
            status,
            tickets_sold,
            pot,
            winner: (winner != Address::ZERO).then_some(winner),
        })
    }

    async fn lottery_count(&self) -> Result<u64, SourceError> {
        let data = self.eth_call(LOTTERY_COUNT_SELECTOR.to_vec()).await?;
        let mut words = WordReader::new(&data);
        words.u64().map_err(|e| SourceError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn word_u64(value: u64) -> [u8; 32] {
        U256::from(value).to_be_bytes::<32>()
    }

    fn word_address(addr: Address) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(addr.as_slice());
        word
    }

    fn log_from_words(words: &[[u8; 32]]) -> RawLog {
        RawLog {
            block_number: 100,
            data: words.concat(),
        }
    }

    #[test]
    fn client_construction_succeeds_with_defaults() {
        let url: Url = "https://rpc.example.com".parse().unwrap();
        assert!(RpcLotterySource::new(url, Address::ZERO).is_ok());
    }

    #[test]
    fn topics_are_distinct_per_kind() {
        for a in EventKind::ALL {
            for b in EventKind::ALL {
                if a != b {
                    assert_ne!(topic0(a), topic0(b));
                }
            }
        }
    }

    #[test]
    fn decodes_ticket_purchased() {
        let buyer = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
        let log = log_from_words(&[
            word_u64(1),
            word_address(buyer),
            word_u64(3),
            word_u64(230),
        ]);
        let event = decode_event(EventKind::TicketPurchased, &log).unwrap();
        assert_eq!(
            event,
            ChainEvent::TicketPurchased(TicketPurchased {
                id: 1,
                buyer,
                new_tickets_sold: 3,
                new_pot: U256::from(230u64),
            })
        );
    }

    #[test]
    fn decodes_lottery_created() {
        let creator = address!("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045");
        let log = log_from_words(&[
            word_u64(7),
            word_address(creator),
            word_u64(10),
            word_u64(200),
            word_u64(1_700_000_600),
        ]);
        let event = decode_event(EventKind::LotteryCreated, &log).unwrap();
        assert_eq!(
            event,
            ChainEvent::Created(LotteryCreated {
                id: 7,
                creator,
                ticket_price: U256::from(10u64),
                prize_amount: U256::from(200u64),
                buy_deadline: 1_700_000_600,
            })
        );
    }

    #[test]
    fn short_data_is_malformed() {
        let log = log_from_words(&[word_u64(1)]);
        assert!(matches!(
            decode_event(EventKind::TicketPurchased, &log),
            Err(DecodeError::ShortData { expected: 4, got: 1 })
        ));
    }

    #[test]
    fn oversized_counter_is_malformed() {
        let mut overflow = [0xffu8; 32];
        overflow[0] = 0xff;
        let log = log_from_words(&[overflow]);
        assert!(matches!(
            decode_event(EventKind::LotteryExpired, &log),
            Err(DecodeError::WordOverflow { index: 0 })
        ));
    }
}
