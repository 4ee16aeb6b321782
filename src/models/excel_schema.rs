use serde::{Deserialize, Serialize};

/// Every column the pipeline understands: the 13 statement columns in output
/// order, followed by the return columns carried through normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    DeliveryDate,
    OrderNumber,
    ItemName,
    Quantity,
    Unit,
    UnitPrice,
    Subtotal,
    Tax,
    TotalWithTax,
    Department,
    TaxRate,
    SupplierAccount,
    Category,
    ReturnFlag,
    ReturnQuantity,
    ReturnSubtotal,
    ReturnTax,
    ReturnTotal,
}

pub const COLUMN_COUNT: usize = 18;
pub const SCHEMA_LEN: usize = 13;

/// Marker in the return column that flags a line as returned.
pub const RETURN_MARKER: &str = "是";
/// Markers that are understood as "not returned" without a warning.
pub const NON_RETURN_MARKERS: &[&str] = &["否"];

impl Column {
    pub const ALL: [Column; COLUMN_COUNT] = [
        Column::DeliveryDate,
        Column::OrderNumber,
        Column::ItemName,
        Column::Quantity,
        Column::Unit,
        Column::UnitPrice,
        Column::Subtotal,
        Column::Tax,
        Column::TotalWithTax,
        Column::Department,
        Column::TaxRate,
        Column::SupplierAccount,
        Column::Category,
        Column::ReturnFlag,
        Column::ReturnQuantity,
        Column::ReturnSubtotal,
        Column::ReturnTax,
        Column::ReturnTotal,
    ];

    /// The expected schema, in statement order.
    pub const SCHEMA: [Column; SCHEMA_LEN] = [
        Column::DeliveryDate,
        Column::OrderNumber,
        Column::ItemName,
        Column::Quantity,
        Column::Unit,
        Column::UnitPrice,
        Column::Subtotal,
        Column::Tax,
        Column::TotalWithTax,
        Column::Department,
        Column::TaxRate,
        Column::SupplierAccount,
        Column::Category,
    ];

    /// Canonical header text as it appears in the supplier export.
    pub fn label(self) -> &'static str {
        match self {
            Column::DeliveryDate => "收货日期",
            Column::OrderNumber => "订单号",
            Column::ItemName => "商品名称",
            Column::Quantity => "实收数量",
            Column::Unit => "基本单位",
            Column::UnitPrice => "单价(结算)",
            Column::Subtotal => "小计金额(结算)",
            Column::Tax => "税额(结算)",
            Column::TotalWithTax => "小计价税(结算)",
            Column::Department => "部门",
            Column::TaxRate => "税率",
            Column::SupplierAccount => "供应商/备用金报销账户",
            Column::Category => "商品分类",
            Column::ReturnFlag => "退货",
            Column::ReturnQuantity => "合计退货数量",
            Column::ReturnSubtotal => "退货合计金额(结算)",
            Column::ReturnTax => "退货合计税额(结算)",
            Column::ReturnTotal => "退货合计价税(结算)",
        }
    }

    /// Legacy header texts accepted when the canonical one is absent.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::Unit => &["单位"],
            _ => &[],
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_schema(self) -> bool {
        self.index() < SCHEMA_LEN
    }

    /// For a statement column that has a return counterpart, the return column
    /// whose negated value replaces it on a synthesized return line.
    pub fn return_source(self) -> Option<Column> {
        match self {
            Column::Quantity => Some(Column::ReturnQuantity),
            Column::Subtotal => Some(Column::ReturnSubtotal),
            Column::Tax => Some(Column::ReturnTax),
            Column::TotalWithTax => Some(Column::ReturnTotal),
            _ => None,
        }
    }
}

/// Header labels of the statement, in output order.
pub fn expected_headers() -> [&'static str; SCHEMA_LEN] {
    Column::SCHEMA.map(Column::label)
}

/// Source positions resolved once per file, indexed by [`Column::index`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMap {
    positions: [Option<usize>; COLUMN_COUNT],
}

impl ColumnMap {
    pub fn position(&self, column: Column) -> Option<usize> {
        self.positions[column.index()]
    }

    pub fn set(&mut self, column: Column, position: usize) {
        self.positions[column.index()] = Some(position);
    }

    pub fn contains(&self, column: Column) -> bool {
        self.position(column).is_some()
    }

    /// Statement columns with no source column, in schema order.
    pub fn missing_schema_columns(&self) -> Vec<Column> {
        Column::SCHEMA
            .into_iter()
            .filter(|c| !self.contains(*c))
            .collect()
    }

    /// Present columns in output order (schema first, then return columns).
    pub fn present(&self) -> impl Iterator<Item = Column> + '_ {
        Column::ALL.into_iter().filter(|c| self.contains(*c))
    }
}
