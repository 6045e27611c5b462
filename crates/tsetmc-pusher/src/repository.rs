//! In-memory repository of realtime market data
//!
//! Every change applied from the market-watch feeds is published as a
//! [`MarketUpdate`] on a broadcast channel once the repository lock is released.

use crate::models::*;
use crate::{PusherError, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use time::{Date, PrimitiveDateTime};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// A change to one instrument's realtime data
#[derive(Debug, Clone, PartialEq)]
pub enum MarketUpdate {
    Trade(Instrument),
    Thresholds(Instrument),
    OrderBook {
        instrument: Instrument,
        /// Indices of the rows that changed
        rows: Vec<usize>,
    },
    ClientType(Instrument),
}

impl MarketUpdate {
    pub fn instrument(&self) -> &Instrument {
        match self {
            MarketUpdate::Trade(instrument)
            | MarketUpdate::Thresholds(instrument)
            | MarketUpdate::ClientType(instrument) => instrument,
            MarketUpdate::OrderBook { instrument, .. } => instrument,
        }
    }

    pub fn isin(&self) -> &str {
        self.instrument().isin()
    }
}

#[derive(Debug, Default)]
struct Instruments {
    by_isin: HashMap<String, Instrument>,
    /// TSETMC code to ISIN
    codes: HashMap<String, String>,
}

/// Holds all realtime data for the market
#[derive(Debug)]
pub struct MarketRealtimeData {
    instruments: RwLock<Instruments>,
    updates: broadcast::Sender<MarketUpdate>,
}

impl MarketRealtimeData {
    /// Create an empty repository whose update stream buffers `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity.max(1));
        Self {
            instruments: RwLock::new(Instruments::default()),
            updates,
        }
    }

    /// Receive every update applied after this call
    pub fn subscribe(&self) -> broadcast::Receiver<MarketUpdate> {
        self.updates.subscribe()
    }

    /// Applies new market-watch rows, returning the number of updates emitted
    ///
    /// `trade_date` is combined with each row's last trade time.
    pub fn apply_new_trade_data(
        &self,
        trade_data: &[MarketWatchTradeData],
        trade_date: Date,
    ) -> Result<usize> {
        let mut emitted = Vec::new();
        {
            let mut instruments = self
                .instruments
                .write()
                .map_err(|_| PusherError::LockPoisoned("instruments"))?;
            let Instruments { by_isin, codes } = &mut *instruments;

            for mwi in trade_data {
                let isin = &mwi.identification.isin;
                let instrument = by_isin.entry(isin.clone()).or_insert_with(|| {
                    info!("New instrument [{}] ({})", isin, mwi.identification.ticker);
                    codes.insert(mwi.identification.tsetmc_code.clone(), isin.clone());
                    Instrument::new(mwi.identification.clone())
                });

                let trade_unchanged = instrument
                    .intraday_trade_candle
                    .last_trade_datetime
                    .is_some_and(|ltd| ltd.time() == mwi.last_trade_time);
                if !trade_unchanged {
                    update_instrument_trade_data(instrument, mwi, trade_date);
                    emitted.push(MarketUpdate::Trade(instrument.clone()));
                }

                if instrument.order_limitations != mwi.order_limitations {
                    instrument.order_limitations = mwi.order_limitations;
                    emitted.push(MarketUpdate::Thresholds(instrument.clone()));
                }

                let mut changed_rows = Vec::new();
                for (rn, row) in mwi.orderbook.rows.iter().enumerate() {
                    if instrument.orderbook.rows[rn] != *row {
                        instrument.orderbook.rows[rn] = *row;
                        changed_rows.push(rn);
                    }
                }
                if !changed_rows.is_empty() {
                    emitted.push(MarketUpdate::OrderBook {
                        instrument: instrument.clone(),
                        rows: changed_rows,
                    });
                }
            }
        }

        Ok(self.publish(emitted))
    }

    /// Applies new client-type rows, returning the number of updates emitted
    ///
    /// Rows for instruments not yet seen in the market watch are ignored.
    pub fn apply_new_client_type(
        &self,
        client_type: &[MarketWatchClientTypeData],
    ) -> Result<usize> {
        let mut emitted = Vec::new();
        {
            let mut instruments = self
                .instruments
                .write()
                .map_err(|_| PusherError::LockPoisoned("instruments"))?;
            let Instruments { by_isin, codes } = &mut *instruments;

            for mwi in client_type {
                let Some(instrument) = codes
                    .get(&mwi.tsetmc_code)
                    .and_then(|isin| by_isin.get_mut(isin))
                else {
                    continue;
                };
                if instrument.client_type != mwi.client_type {
                    instrument.client_type = mwi.client_type;
                    emitted.push(MarketUpdate::ClientType(instrument.clone()));
                }
            }
        }

        Ok(self.publish(emitted))
    }

    /// Snapshots of the requested instruments, in order, `None` for unknown ISINs
    pub fn get_instruments<S: AsRef<str>>(&self, isins: &[S]) -> Result<Vec<Option<Instrument>>> {
        let instruments = self
            .instruments
            .read()
            .map_err(|_| PusherError::LockPoisoned("instruments"))?;
        Ok(isins
            .iter()
            .map(|isin| instruments.by_isin.get(isin.as_ref()).cloned())
            .collect())
    }

    pub fn get_instrument(&self, isin: &str) -> Result<Option<Instrument>> {
        Ok(self.get_instruments(&[isin])?.pop().flatten())
    }

    /// Number of instruments known to the repository
    pub fn len(&self) -> usize {
        self.instruments
            .read()
            .map(|instruments| instruments.by_isin.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, emitted: Vec<MarketUpdate>) -> usize {
        let count = emitted.len();
        for update in emitted {
            // No receivers is fine: nobody is listening yet
            if self.updates.send(update).is_err() {
                debug!("No receivers for market update");
            }
        }
        count
    }
}

impl Default for MarketRealtimeData {
    fn default() -> Self {
        Self::new(1024)
    }
}

fn update_instrument_trade_data(
    instrument: &mut Instrument,
    mwi: &MarketWatchTradeData,
    trade_date: Date,
) {
    let candle = &mut instrument.intraday_trade_candle;
    let source = &mwi.intraday_trade_candle;
    candle.previous_price = source.previous_price;
    candle.open_price = source.open_price;
    candle.close_price = source.close_price;
    candle.last_price = source.last_price;
    candle.max_price = source.max_price;
    candle.min_price = source.min_price;
    candle.trade_num = source.trade_num;
    candle.trade_volume = source.trade_volume;
    candle.trade_value = source.trade_value;
    candle.last_trade_datetime = Some(PrimitiveDateTime::new(trade_date, mwi.last_trade_time));
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, time};

    fn row(
        isin: &str,
        code: &str,
        last_trade: time::Time,
        last_price: i64,
    ) -> MarketWatchTradeData {
        let mut mwi =
            MarketWatchTradeData::new(InstrumentIdentification::new(isin, code), last_trade);
        mwi.intraday_trade_candle.last_price = last_price;
        mwi.intraday_trade_candle.trade_num = 10;
        mwi
    }

    #[test]
    fn test_new_instrument_is_created_with_trade() {
        let repo = MarketRealtimeData::new(16);
        let mut rx = repo.subscribe();

        let count = repo
            .apply_new_trade_data(
                &[row(
                    "IRO1FOLD0001",
                    "46348559193224090",
                    time!(9:05:10),
                    5230,
                )],
                date!(2024 - 01 - 20),
            )
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(repo.len(), 1);
        let instrument = repo.get_instrument("IRO1FOLD0001").unwrap().unwrap();
        assert_eq!(instrument.intraday_trade_candle.last_price, 5230);
        assert_eq!(
            instrument.intraday_trade_candle.last_trade_datetime,
            Some(PrimitiveDateTime::new(date!(2024 - 01 - 20), time!(9:05:10)))
        );
        assert!(matches!(rx.try_recv().unwrap(), MarketUpdate::Trade(_)));
    }

    #[test]
    fn test_same_trade_time_is_not_reapplied() {
        let repo = MarketRealtimeData::new(16);
        let day = date!(2024 - 01 - 20);
        repo.apply_new_trade_data(&[row("IRO1FOLD0001", "1", time!(9:05:10), 5230)], day).unwrap();

        // Same time, different price: candle stays as it was
        let count = repo
            .apply_new_trade_data(&[row("IRO1FOLD0001", "1", time!(9:05:10), 5300)], day)
            .unwrap();
        assert_eq!(count, 0);
        let instrument = repo.get_instrument("IRO1FOLD0001").unwrap().unwrap();
        assert_eq!(instrument.intraday_trade_candle.last_price, 5230);

        let count = repo
            .apply_new_trade_data(&[row("IRO1FOLD0001", "1", time!(9:06:00), 5300)], day)
            .unwrap();
        assert_eq!(count, 1);
        let instrument = repo.get_instrument("IRO1FOLD0001").unwrap().unwrap();
        assert_eq!(instrument.intraday_trade_candle.last_price, 5300);
    }

    #[test]
    fn test_orderbook_reports_changed_rows_only() {
        let repo = MarketRealtimeData::new(16);
        let day = date!(2024 - 01 - 20);
        let mut mwi = row("IRO1FOLD0001", "1", time!(9:05:10), 5230);
        repo.apply_new_trade_data(std::slice::from_ref(&mwi), day).unwrap();

        let mut rx = repo.subscribe();
        mwi.orderbook.rows[0].demand.price = 5220;
        mwi.orderbook.rows[3].supply.volume = 1000;
        repo.apply_new_trade_data(&[mwi], day).unwrap();

        match rx.try_recv().unwrap() {
            MarketUpdate::OrderBook { instrument, rows } => {
                assert_eq!(rows, vec![0, 3]);
                assert_eq!(instrument.orderbook.rows[0].demand.price, 5220);
                assert_eq!(instrument.orderbook.rows[3].supply.volume, 1000);
            }
            other => panic!("unexpected update: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_thresholds_change_emits_update() {
        let repo = MarketRealtimeData::new(16);
        let mut mwi = row("IRO1FOLD0001", "1", time!(9:05:10), 5230);
        mwi.order_limitations = OrderLimitations { max_price: 5500, min_price: 5000 };

        let mut rx = repo.subscribe();
        repo.apply_new_trade_data(&[mwi], date!(2024 - 01 - 20)).unwrap();

        assert!(matches!(rx.try_recv().unwrap(), MarketUpdate::Trade(_)));
        match rx.try_recv().unwrap() {
            MarketUpdate::Thresholds(instrument) => {
                assert_eq!(instrument.order_limitations.max_price, 5500);
                assert_eq!(instrument.order_limitations.min_price, 5000);
            }
            other => panic!("unexpected update: {:?}", other),
        }
    }

    #[test]
    fn test_client_type_matched_by_code() {
        let repo = MarketRealtimeData::new(16);
        repo.apply_new_trade_data(
            &[row("IRO1FOLD0001", "777", time!(9:05:10), 5230)],
            date!(2024 - 01 - 20),
        )
        .unwrap();

        let mut client_type = ClientType::default();
        client_type.natural.buy.num = 42;
        client_type.legal.sell.volume = 1_000_000;

        let rows = vec![
            MarketWatchClientTypeData {
                tsetmc_code: "777".into(),
                client_type,
            },
            MarketWatchClientTypeData {
                tsetmc_code: "unknown".into(),
                client_type,
            },
        ];
        assert_eq!(repo.apply_new_client_type(&rows).unwrap(), 1);
        // Unchanged data emits nothing
        assert_eq!(repo.apply_new_client_type(&rows).unwrap(), 0);

        let instrument = repo.get_instrument("IRO1FOLD0001").unwrap().unwrap();
        assert_eq!(instrument.client_type, client_type);
    }

    #[test]
    fn test_get_instruments_keeps_order() {
        let repo = MarketRealtimeData::new(16);
        repo.apply_new_trade_data(
            &[row("IRO1FOLD0001", "1", time!(9:05:10), 1)],
            date!(2024 - 01 - 20),
        )
        .unwrap();

        let found = repo
            .get_instruments(&["IRO1IKCO0001", "IRO1FOLD0001"])
            .unwrap();
        assert!(found[0].is_none());
        assert_eq!(found[1].as_ref().unwrap().isin(), "IRO1FOLD0001");
    }
}
