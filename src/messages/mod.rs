//! Typed builders for application-level (non-administrative) message
//! types. The administrative set lives on [`crate::message::Message`]
//! directly (spec.md §4.2); this module is where a consuming application's
//! own message types are expected to grow, following the same
//! builder-then-`Message` pattern. `ExecutionReport` is kept as the one
//! worked example, grounded on the teacher's own `ExecutionReportBuilder`.

use crate::dictionary::{tags, MsgType};
use crate::error::Result;
use crate::fieldmap::FieldMap;
use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecType {
    New,
    Canceled,
    Replaced,
    Rejected,
    Fill,
}

impl ExecType {
    fn as_str(self) -> &'static str {
        match self {
            ExecType::New => "0",
            ExecType::Canceled => "4",
            ExecType::Replaced => "5",
            ExecType::Rejected => "8",
            ExecType::Fill => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrdStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrdStatus {
    fn as_str(self) -> &'static str {
        match self {
            OrdStatus::New => "0",
            OrdStatus::PartiallyFilled => "1",
            OrdStatus::Filled => "2",
            OrdStatus::Canceled => "4",
            OrdStatus::Rejected => "8",
        }
    }
}

#[derive(Debug, Default)]
pub struct ExecutionReportBuilder {
    cl_ord_id: Option<String>,
    order_id: Option<String>,
    exec_id: Option<String>,
    symbol: Option<String>,
    side: Option<String>,
    exec_type: Option<ExecType>,
    ord_status: Option<OrdStatus>,
    last_px: Option<f64>,
    last_qty: Option<i64>,
    cum_qty: Option<i64>,
    leaves_qty: Option<i64>,
}

impl ExecutionReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cl_ord_id(mut self, v: impl Into<String>) -> Self {
        self.cl_ord_id = Some(v.into());
        self
    }
    pub fn order_id(mut self, v: impl Into<String>) -> Self {
        self.order_id = Some(v.into());
        self
    }
    pub fn exec_id(mut self, v: impl Into<String>) -> Self {
        self.exec_id = Some(v.into());
        self
    }
    pub fn symbol(mut self, v: impl Into<String>) -> Self {
        self.symbol = Some(v.into());
        self
    }
    pub fn side(mut self, v: impl Into<String>) -> Self {
        self.side = Some(v.into());
        self
    }
    pub fn exec_type(mut self, v: ExecType) -> Self {
        self.exec_type = Some(v);
        self
    }
    pub fn ord_status(mut self, v: OrdStatus) -> Self {
        self.ord_status = Some(v);
        self
    }
    pub fn last_px(mut self, v: f64) -> Self {
        self.last_px = Some(v);
        self
    }
    pub fn last_qty(mut self, v: i64) -> Self {
        self.last_qty = Some(v);
        self
    }
    pub fn cum_qty(mut self, v: i64) -> Self {
        self.cum_qty = Some(v);
        self
    }
    pub fn leaves_qty(mut self, v: i64) -> Self {
        self.leaves_qty = Some(v);
        self
    }

    /// Builds the wire [`Message`]. `ClOrdID`, `OrderID`, and `ExecID` are
    /// required; everything else is omitted if never set.
    pub fn build(self, begin_string: impl Into<String>) -> Result<Message> {
        let mut msg = Message::new(begin_string, FieldMap::dict());
        msg.set(tags::MSG_TYPE, MsgType::ExecutionReport.as_str())?;
        msg.set(tags::CL_ORD_ID, self.cl_ord_id.unwrap_or_default())?;
        msg.set(tags::ORDER_ID, self.order_id.unwrap_or_default())?;
        msg.set(tags::EXEC_ID, self.exec_id.unwrap_or_default())?;
        if let Some(symbol) = self.symbol {
            msg.set(tags::SYMBOL, symbol)?;
        }
        if let Some(side) = self.side {
            msg.set(tags::SIDE, side)?;
        }
        msg.set(tags::EXEC_TYPE, self.exec_type.unwrap_or(ExecType::New).as_str())?;
        msg.set(tags::ORD_STATUS, self.ord_status.unwrap_or(OrdStatus::New).as_str())?;
        if let Some(px) = self.last_px {
            msg.set(tags::LAST_PX, px.to_string())?;
        }
        if let Some(qty) = self.last_qty {
            msg.set(tags::LAST_QTY, qty.to_string())?;
        }
        if let Some(qty) = self.cum_qty {
            msg.set(tags::CUM_QTY, qty.to_string())?;
        }
        if let Some(qty) = self.leaves_qty {
            msg.set(tags::LEAVES_QTY, qty.to_string())?;
        }
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_an_execution_report_message() {
        let msg = ExecutionReportBuilder::new()
            .cl_ord_id("ORD1")
            .order_id("O1")
            .exec_id("E1")
            .exec_type(ExecType::Fill)
            .ord_status(OrdStatus::Filled)
            .last_px(101.25)
            .last_qty(100)
            .build("FIX.4.4")
            .unwrap();

        assert_eq!(msg.msg_type(), Some(MsgType::ExecutionReport.as_str()));
        assert_eq!(msg.get(tags::CL_ORD_ID).unwrap(), "ORD1");
        assert_eq!(msg.get(tags::EXEC_TYPE).unwrap(), "F");
        assert_eq!(msg.get(tags::LAST_QTY).unwrap(), 100i64);
    }
}
