//! Sales Aggregation Service
//!
//! Turns a normalized financial feed into per-day profit and loss. Only
//! records with a realization date count, and anything that looks like a
//! return, refund, cancellation or rejection is dropped entirely.

use crate::db::DailySalesAggregate;
use crate::marketplaces::types::{DateRange, MarketplaceKind, OperationKind, SalesTransaction};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::warn;

/// Case-insensitive markers of non-sale operations
pub const EXCLUSION_MARKERS: [&str; 8] = [
    "return",
    "refund",
    "cancel",
    "reject",
    "возврат",
    "отказ",
    "отмен",
    "отклонен",
];

#[derive(Debug, Default)]
struct DayTotals {
    orders_count: i64,
    items_sold: i64,
    revenue: f64,
    commission: f64,
    logistics: f64,
    storage: f64,
    penalties: f64,
    returns: f64,
    surcharges: f64,
}

/// Sales aggregation service for business logic
pub struct AggregationService;

impl AggregationService {
    /// Whether a record must not contribute to any aggregate
    pub fn is_excluded(tx: &SalesTransaction) -> bool {
        if tx.realization_date.is_none() || tx.kind == OperationKind::Return {
            return true;
        }
        let name = tx.operation_name.to_lowercase();
        EXCLUSION_MARKERS.iter().any(|marker| name.contains(marker))
    }

    /// Aggregate `transactions` by realization date.
    ///
    /// Records outside `range` are ignored. `delivered_units` fills the items
    /// count of days where the transactions carried none.
    pub fn aggregate(
        marketplace: MarketplaceKind,
        account_name: &str,
        transactions: &[SalesTransaction],
        range: DateRange,
        delivered_units: &BTreeMap<NaiveDate, i64>,
    ) -> Vec<DailySalesAggregate> {
        let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();

        for tx in transactions {
            if Self::is_excluded(tx) {
                continue;
            }
            let Some(date) = tx.realization_date.filter(|d| range.contains(*d)) else {
                continue;
            };

            let quantity = if tx.quantity < 0 {
                warn!(account = account_name, %date, quantity = tx.quantity, "Negative quantity floored to zero");
                0
            } else {
                tx.quantity
            };
            let revenue = if tx.revenue < 0.0 || !tx.revenue.is_finite() {
                warn!(account = account_name, %date, revenue = tx.revenue, "Negative revenue floored to zero");
                0.0
            } else {
                tx.revenue
            };

            let day = days.entry(date).or_default();

            if tx.kind == OperationKind::Sale && (quantity > 0 || revenue > 0.0) {
                day.orders_count += 1;
                day.items_sold += quantity;
                day.revenue += revenue;
            }

            day.commission += match tx.commission_percent {
                Some(percent) if percent > 0.0 && revenue > 0.0 => revenue * percent / 100.0,
                _ => tx.commission_amount.abs(),
            };
            day.logistics += tx.logistics.abs();
            day.storage += tx.storage.abs();
            day.penalties += tx.penalty.abs();
            day.returns += tx.return_amount.abs();
            day.surcharges += tx.surcharge.abs();
        }

        days.into_iter()
            .map(|(date, mut day)| {
                if day.items_sold == 0 {
                    if let Some(units) = delivered_units.get(&date).filter(|u| **u > 0) {
                        day.items_sold = *units;
                    }
                }

                let total_expenses = day.commission
                    + day.logistics
                    + day.storage
                    + day.penalties
                    + day.returns
                    + day.surcharges;
                let average_order_value = if day.orders_count > 0 {
                    day.revenue / day.orders_count as f64
                } else {
                    0.0
                };

                DailySalesAggregate {
                    marketplace,
                    account_name: account_name.to_string(),
                    date,
                    orders_count: day.orders_count,
                    items_sold: day.items_sold,
                    revenue: round_money(day.revenue),
                    commission: round_money(day.commission),
                    logistics: round_money(day.logistics),
                    storage: round_money(day.storage),
                    penalties: round_money(day.penalties),
                    returns: round_money(day.returns),
                    surcharges: round_money(day.surcharges),
                    total_expenses: round_money(total_expenses),
                    profit: round_money(day.revenue - total_expenses),
                    average_order_value: round_money(average_order_value),
                }
            })
            .collect()
    }
}

fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn january() -> DateRange {
        DateRange::new(day(1), day(31)).unwrap()
    }

    fn sale(d: u32, quantity: i64, revenue: f64) -> SalesTransaction {
        SalesTransaction {
            kind: OperationKind::Sale,
            operation_name: "Продажа".into(),
            quantity,
            revenue,
            realization_date: Some(day(d)),
            ..Default::default()
        }
    }

    #[test]
    fn test_returns_do_not_count() {
        let mut refund = sale(15, 1, 400.0);
        refund.operation_name = "Возврат".into();

        let rows = AggregationService::aggregate(
            MarketplaceKind::Wildberries,
            "main",
            &[sale(15, 2, 1000.0), refund],
            january(),
            &BTreeMap::new(),
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].items_sold, 2);
        assert_eq!(rows[0].revenue, 1000.0);
        assert_eq!(rows[0].orders_count, 1);
    }

    #[test]
    fn test_exclusion_vocabulary() {
        for name in ["Refund issued", "ClientReturnAgentOperation", "Отмена заказа", "Отказ покупателя", "Rejected", "Отклонено"] {
            let mut tx = sale(15, 1, 100.0);
            tx.operation_name = name.into();
            assert!(AggregationService::is_excluded(&tx), "{} should be excluded", name);
        }

        let mut undated = sale(15, 1, 100.0);
        undated.realization_date = None;
        assert!(AggregationService::is_excluded(&undated));

        let mut returned = sale(15, 1, 100.0);
        returned.kind = OperationKind::Return;
        assert!(AggregationService::is_excluded(&returned));

        assert!(!AggregationService::is_excluded(&sale(15, 1, 100.0)));
    }

    #[test]
    fn test_expenses_and_profit() {
        let mut first = sale(10, 1, 1000.0);
        first.commission_percent = Some(15.0);
        first.logistics = 50.0;
        first.surcharge = 5.0;

        let mut second = sale(10, 3, 2000.0);
        second.commission_amount = -300.0;
        second.return_amount = -40.0;

        let storage = SalesTransaction {
            kind: OperationKind::Service,
            operation_name: "Хранение".into(),
            storage: -25.0,
            realization_date: Some(day(10)),
            ..Default::default()
        };

        let rows = AggregationService::aggregate(
            MarketplaceKind::Ozon,
            "shop",
            &[first, second, storage],
            january(),
            &BTreeMap::new(),
        );
        let row = &rows[0];

        assert_eq!(row.orders_count, 2);
        assert_eq!(row.items_sold, 4);
        assert_eq!(row.revenue, 3000.0);
        assert_eq!(row.commission, 450.0);
        assert_eq!(row.logistics, 50.0);
        assert_eq!(row.storage, 25.0);
        assert_eq!(row.returns, 40.0);
        assert_eq!(row.surcharges, 5.0);
        assert_eq!(row.total_expenses, 570.0);
        assert_eq!(row.profit, 2430.0);
        assert_eq!(row.average_order_value, 1500.0);
    }

    #[test]
    fn test_negative_values_are_floored() {
        let rows = AggregationService::aggregate(
            MarketplaceKind::Wildberries,
            "main",
            &[sale(5, -2, -300.0), sale(5, 1, 200.0)],
            january(),
            &BTreeMap::new(),
        );

        assert_eq!(rows[0].items_sold, 1);
        assert_eq!(rows[0].revenue, 200.0);
        assert_eq!(rows[0].orders_count, 1);
    }

    #[test]
    fn test_out_of_range_dates_and_ordering() {
        let mut outside = sale(1, 1, 100.0);
        outside.realization_date = NaiveDate::from_ymd_opt(2023, 12, 31);

        let rows = AggregationService::aggregate(
            MarketplaceKind::Wildberries,
            "main",
            &[sale(20, 1, 100.0), outside, sale(3, 1, 100.0)],
            january(),
            &BTreeMap::new(),
        );

        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(3), day(20)]);
    }

    #[test]
    fn test_delivered_units_fill_only_empty_days() {
        let logistics_only = SalesTransaction {
            kind: OperationKind::Logistics,
            logistics: 80.0,
            realization_date: Some(day(7)),
            ..Default::default()
        };
        let mut units = BTreeMap::new();
        units.insert(day(7), 5);
        units.insert(day(8), 9);

        let rows = AggregationService::aggregate(
            MarketplaceKind::Ozon,
            "shop",
            &[logistics_only, sale(8, 2, 500.0)],
            january(),
            &units,
        );

        assert_eq!(rows[0].items_sold, 5);
        assert_eq!(rows[0].orders_count, 0);
        assert_eq!(rows[0].average_order_value, 0.0);
        assert_eq!(rows[1].items_sold, 2);
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let txs = vec![sale(2, 1, 100.0), sale(2, 2, 250.5), sale(4, 1, 99.99)];
        let first = AggregationService::aggregate(MarketplaceKind::Wildberries, "main", &txs, january(), &BTreeMap::new());
        let second = AggregationService::aggregate(MarketplaceKind::Wildberries, "main", &txs, january(), &BTreeMap::new());
        assert_eq!(first, second);
    }
}
