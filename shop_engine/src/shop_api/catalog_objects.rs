use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db_types::{
    Category,
    Gender,
    MeasurementName,
    Money,
    OrderStatusType,
    PaymentMethodSetting,
    ShopSettings,
    Size,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortFactor {
    #[default]
    CreatedAt,
    Price,
    Name,
}

impl SortFactor {
    pub fn column(&self) -> &'static str {
        match self {
            SortFactor::CreatedAt => "created_at",
            SortFactor::Price => "CAST(price AS REAL)",
            SortFactor::Name => "name",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderFactor {
    Asc,
    #[default]
    Desc,
}

impl OrderFactor {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderFactor::Asc => "ASC",
            OrderFactor::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFilters {
    pub category: Option<Category>,
    pub gender: Option<Gender>,
    pub price_from: Option<Money>,
    pub price_to: Option<Money>,
    pub on_sale: Option<bool>,
    pub tag: Option<String>,
    pub preorder: Option<bool>,
}

impl ProductFilters {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() &&
            self.gender.is_none() &&
            self.price_from.is_none() &&
            self.price_to.is_none() &&
            self.on_sale.is_none() &&
            self.tag.is_none() &&
            self.preorder.is_none()
    }
}

/// A paged product listing request. Hidden products are excluded unless `include_hidden` is set, which only admin
/// listings do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductQuery {
    pub limit: i64,
    pub offset: i64,
    pub sort: Vec<SortFactor>,
    pub order: OrderFactor,
    pub filters: ProductFilters,
    pub include_hidden: bool,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
            sort: vec![SortFactor::CreatedAt],
            order: OrderFactor::Desc,
            filters: ProductFilters::default(),
            include_hidden: false,
        }
    }
}

impl ProductQuery {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset, ..Default::default() }
    }

    pub fn sort_by(mut self, factor: SortFactor) -> Self {
        // The first explicit factor replaces the default
        if self.sort == [SortFactor::CreatedAt] {
            self.sort.clear();
        }
        if !self.sort.contains(&factor) {
            self.sort.push(factor);
        }
        self
    }

    pub fn ordered(mut self, order: OrderFactor) -> Self {
        self.order = order;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.filters.category = Some(category);
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.filters.gender = Some(gender);
        self
    }

    pub fn with_price_range(mut self, from: Option<Money>, to: Option<Money>) -> Self {
        self.filters.price_from = from;
        self.filters.price_to = to;
        self
    }

    pub fn on_sale(mut self, on_sale: bool) -> Self {
        self.filters.on_sale = Some(on_sale);
        self
    }

    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.filters.tag = Some(tag.into());
        self
    }

    pub fn preorder(mut self, preorder: bool) -> Self {
        self.filters.preorder = Some(preorder);
        self
    }

    pub fn including_hidden(mut self) -> Self {
        self.include_hidden = true;
        self
    }
}

impl Display for ProductQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "limit {} offset {}. ", self.limit, self.offset)?;
        let sort = self.sort.iter().map(|s| format!("{s:?}")).collect::<Vec<_>>().join(",");
        write!(f, "sort [{sort}] {}. ", self.order.as_sql())?;
        if let Some(category) = &self.filters.category {
            write!(f, "category: {category}. ")?;
        }
        if let Some(gender) = &self.filters.gender {
            write!(f, "gender: {gender}. ")?;
        }
        if let Some(from) = &self.filters.price_from {
            write!(f, "price >= {from}. ")?;
        }
        if let Some(to) = &self.filters.price_to {
            write!(f, "price <= {to}. ")?;
        }
        if let Some(on_sale) = &self.filters.on_sale {
            write!(f, "on sale: {on_sale}. ")?;
        }
        if let Some(tag) = &self.filters.tag {
            write!(f, "tag: {tag}. ")?;
        }
        if let Some(preorder) = &self.filters.preorder {
            write!(f, "preorder: {preorder}. ")?;
        }
        Ok(())
    }
}

/// An entry in one of the closed dictionaries, as shown to the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub id: i64,
    pub name: String,
}

/// Every closed set the storefront needs to render filters and forms, plus the site-wide switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dictionary {
    pub sizes: Vec<DictionaryEntry>,
    pub categories: Vec<DictionaryEntry>,
    pub measurements: Vec<DictionaryEntry>,
    pub genders: Vec<String>,
    pub order_statuses: Vec<String>,
    pub payment_methods: Vec<PaymentMethodSetting>,
    pub site_available: bool,
    pub max_order_items: i64,
    pub base_currency: String,
}

impl Dictionary {
    pub fn new(settings: ShopSettings, base_currency: &str) -> Self {
        let sizes = Size::ALL.iter().map(|s| DictionaryEntry { id: s.id(), name: s.to_string() }).collect();
        let categories = Category::ALL.iter().map(|c| DictionaryEntry { id: c.id(), name: c.to_string() }).collect();
        let measurements =
            MeasurementName::ALL.iter().map(|m| DictionaryEntry { id: m.id(), name: m.to_string() }).collect();
        let genders = [Gender::Male, Gender::Female, Gender::Unisex].iter().map(|g| g.to_string()).collect();
        let order_statuses = [
            OrderStatusType::Placed,
            OrderStatusType::AwaitingPayment,
            OrderStatusType::Confirmed,
            OrderStatusType::Shipped,
            OrderStatusType::Delivered,
            OrderStatusType::Cancelled,
            OrderStatusType::Refunded,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        Self {
            sizes,
            categories,
            measurements,
            genders,
            order_statuses,
            payment_methods: settings.payment_methods,
            site_available: settings.site_available,
            max_order_items: settings.max_order_items,
            base_currency: base_currency.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroSnapshot {
    pub hero: Option<Value>,
    pub dictionary: Dictionary,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::PaymentMethod;

    #[test]
    fn product_query_builder() {
        let q = ProductQuery::new(10, 20)
            .sort_by(SortFactor::Price)
            .ordered(OrderFactor::Asc)
            .with_category(Category::Coat)
            .with_tag("winter");
        assert_eq!(q.sort, vec![SortFactor::Price]);
        assert_eq!(q.filters.category, Some(Category::Coat));
        assert!(!q.include_hidden);
        assert_eq!(q.to_string(), "limit 10 offset 20. sort [Price] ASC. category: coat. tag: winter. ");
        assert!(ProductQuery::default().filters.is_empty());
    }

    #[test]
    fn dictionary_snapshot() {
        let settings = ShopSettings {
            site_available: true,
            max_order_items: 20,
            payment_methods: vec![PaymentMethodSetting { method: PaymentMethod::Card, allowed: true }],
        };
        let dict = Dictionary::new(settings, "EUR");
        assert_eq!(dict.sizes.len(), 8);
        assert_eq!(dict.categories[0], DictionaryEntry { id: 1, name: "t-shirt".into() });
        assert_eq!(dict.order_statuses.len(), 7);
        assert_eq!(dict.base_currency, "EUR");
    }
}
