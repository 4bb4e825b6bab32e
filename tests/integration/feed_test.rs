//! Normalization of realistic exchange frames

use chrono::Utc;
use market_ingest::data::{batch_to_points, ORDERBOOK_MEASUREMENT, TICKER_MEASUREMENT};
use market_ingest::buffer::{Batch, BufferedRecord};
use market_ingest::feed::{decode_frame, Channel, MarketRecord};
use rust_decimal_macros::dec;

const TICKER_FRAME: &str = r#"{
    "type": "ticker",
    "code": "KRW-BTC",
    "opening_price": 49500000.0,
    "high_price": 51000000.0,
    "low_price": 49000000.0,
    "trade_price": 50000000.0,
    "prev_closing_price": 49382716.0,
    "change": "RISE",
    "change_price": 617284.0,
    "change_rate": 0.0125,
    "trade_volume": 0.015,
    "acc_trade_volume_24h": 1234.5,
    "acc_trade_price_24h": 61725000000.0,
    "timestamp": 1700000000000,
    "stream_type": "REALTIME"
}"#;

const ORDERBOOK_FRAME: &str = r#"{
    "type": "orderbook",
    "code": "KRW-BTC",
    "total_ask_size": 3.0,
    "total_bid_size": 5.0,
    "orderbook_units": [
        {"ask_price": 102, "bid_price": 100, "ask_size": 2, "bid_size": 3},
        {"ask_price": 101, "bid_price": 99, "ask_size": 1, "bid_size": 2}
    ],
    "timestamp": 1700000000000
}"#;

#[test]
fn test_ticker_frame_normalizes() {
    let record = decode_frame(Channel::Ticker, TICKER_FRAME.as_bytes(), Utc::now())
        .unwrap()
        .unwrap();

    let MarketRecord::Tick(tick) = record else {
        panic!("expected a tick");
    };
    assert_eq!(tick.symbol, "KRW-BTC");
    assert_eq!(tick.change, "RISE");
    assert_eq!(tick.trade_price, dec!(50000000));
    assert_eq!(tick.cumulative_value_24h, dec!(61725000000));
    assert_eq!(tick.prev_close, dec!(49382716));
}

#[test]
fn test_orderbook_frame_normalizes() {
    let record = decode_frame(Channel::Orderbook, ORDERBOOK_FRAME.as_bytes(), Utc::now())
        .unwrap()
        .unwrap();

    let MarketRecord::OrderBook(book) = record else {
        panic!("expected an order book");
    };
    assert_eq!(book.best_ask, dec!(101));
    assert_eq!(book.best_bid, dec!(100));
    assert_eq!(book.spread_abs, dec!(1));
    assert_eq!(book.spread_pct.round_dp(3), dec!(0.990));
    assert_eq!(book.asks[0].price, dec!(101));
    assert_eq!(book.bids[0].price, dec!(100));
    assert_eq!(book.total_ask_size, dec!(3));
    assert_eq!(book.total_bid_size, dec!(5));
}

#[test]
fn test_frame_on_wrong_channel_is_ignored() {
    let record = decode_frame(Channel::Orderbook, TICKER_FRAME.as_bytes(), Utc::now()).unwrap();
    assert!(record.is_none());
}

#[test]
fn test_mixed_records_become_typed_points() {
    let now = Utc::now();
    let mut records = Vec::new();
    for _ in 0..3 {
        records.push(decode_frame(Channel::Ticker, TICKER_FRAME.as_bytes(), now).unwrap().unwrap());
    }
    for _ in 0..2 {
        records.push(
            decode_frame(Channel::Orderbook, ORDERBOOK_FRAME.as_bytes(), now)
                .unwrap()
                .unwrap(),
        );
    }

    let batch = Batch::new(
        records
            .into_iter()
            .map(|record| BufferedRecord {
                record,
                ingestion_time: now,
            })
            .collect(),
    );
    let points = batch_to_points(&batch);

    assert_eq!(points.len(), 5);
    let tickers: Vec<_> = points
        .iter()
        .filter(|p| p.measurement == TICKER_MEASUREMENT)
        .collect();
    let books: Vec<_> = points
        .iter()
        .filter(|p| p.measurement == ORDERBOOK_MEASUREMENT)
        .collect();
    assert_eq!(tickers.len(), 3);
    assert_eq!(books.len(), 2);

    assert!(tickers.iter().all(|p| p.field("trade_price").is_some()));
    assert!(tickers.iter().all(|p| p.field("best_ask").is_none()));
    assert!(books.iter().all(|p| p.field("liquidity_score").is_some()));
    assert!(books.iter().all(|p| p.field("trade_price").is_none()));

    let pressure = books[0].field("market_pressure").unwrap();
    assert!((pressure - 0.25).abs() < 1e-9);
}
