//! Compiled-in table profiles
//!
//! One profile per data agent: the table it owns, its columns (fed to the
//! SQL prompt) and the skills advertised on its agent card.

use crate::models::{AgentCapabilities, AgentCard, Skill};
use crate::sql::AllowList;

pub const AGENT_VERSION: &str = "1.0.0";

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub description: &'static str,
    pub allowed_values: &'static [&'static str],
}

#[derive(Debug)]
pub struct SkillSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub tags: &'static [&'static str],
    pub examples: &'static [&'static str],
}

#[derive(Debug)]
pub struct TableProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub table: &'static str,
    pub columns: &'static [Column],
    pub skills: &'static [SkillSpec],
}

impl TableProfile {
    pub fn allow_list(&self, max_rows: u32) -> AllowList {
        AllowList::new(self.table).with_max_rows(max_rows)
    }

    /// Discovery document served at `/.well-known/agent-card.json`.
    pub fn card(&self, url: &str) -> AgentCard {
        AgentCard {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            url: url.to_string(),
            version: AGENT_VERSION.to_string(),
            table: self.table.to_string(),
            capabilities: AgentCapabilities::default(),
            skills: self
                .skills
                .iter()
                .map(|s| Skill {
                    id: s.id.to_string(),
                    name: s.name.to_string(),
                    description: s.description.to_string(),
                    tags: s.tags.iter().map(|t| t.to_string()).collect(),
                    examples: s.examples.iter().map(|e| e.to_string()).collect(),
                })
                .collect(),
        }
    }
}

pub static PROFILES: [&TableProfile; 3] = [&CUSTOMERS, &ORDERS, &PRODUCTS];

pub fn find(id: &str) -> Option<&'static TableProfile> {
    PROFILES.iter().copied().find(|p| p.id.eq_ignore_ascii_case(id))
}

const fn column(name: &'static str, sql_type: &'static str) -> Column {
    Column {
        name,
        sql_type,
        description: "",
        allowed_values: &[],
    }
}

//
// ================= Customers =================
//

pub static CUSTOMERS: TableProfile = TableProfile {
    id: "customers",
    name: "Customers Data Agent",
    description: "Specialized agent for customer data analytics. Handles queries about customer \
counts, segmentation, lifetime value, regional distribution, and customer trends over time.",
    table: "customers",
    columns: &[
        Column {
            description: "primary key",
            ..column("customer_id", "UUID")
        },
        Column {
            description: "unique",
            ..column("email", "VARCHAR(255)")
        },
        column("full_name", "VARCHAR(255)"),
        Column {
            allowed_values: &["North America", "Europe", "Asia Pacific", "Latin America"],
            ..column("region", "VARCHAR(100)")
        },
        Column {
            allowed_values: &["Consumer", "Corporate", "Small Business"],
            ..column("segment", "VARCHAR(50)")
        },
        column("created_at", "TIMESTAMP WITH TIME ZONE"),
        column("lifetime_value", "DECIMAL(12, 2)"),
        column("order_count", "INTEGER"),
        column("last_order_date", "TIMESTAMP WITH TIME ZONE"),
        column("is_active", "BOOLEAN"),
    ],
    skills: &[
        SkillSpec {
            id: "customer_count",
            name: "Customer Count",
            description: "Count customers with optional filtering by region, segment, or date range",
            tags: &["count", "customers", "aggregation"],
            examples: &[
                "How many customers do we have?",
                "Count customers in Europe",
                "How many Corporate segment customers joined this year?",
            ],
        },
        SkillSpec {
            id: "customer_lifetime_value",
            name: "Customer Lifetime Value Analysis",
            description: "Analyze customer lifetime value (LTV) by segment, region, or cohort",
            tags: &["ltv", "revenue", "customers", "aggregation"],
            examples: &[
                "What is the average customer lifetime value?",
                "Show LTV by customer segment",
                "Top 10 customers by lifetime value",
            ],
        },
        SkillSpec {
            id: "customer_trends",
            name: "Customer Trends",
            description: "Time-series analysis of customer acquisition, churn, and activity",
            tags: &["trends", "time-series", "customers"],
            examples: &[
                "Show new customer sign-ups by month",
                "Customer growth trend over the last year",
            ],
        },
        SkillSpec {
            id: "customer_list",
            name: "Customer List",
            description: "Retrieve filtered list of customers with their details",
            tags: &["list", "customers", "details"],
            examples: &[
                "List all customers from Asia Pacific",
                "Show inactive customers",
            ],
        },
    ],
};

//
// ================= Orders =================
//

pub static ORDERS: TableProfile = TableProfile {
    id: "orders",
    name: "Orders Data Agent",
    description: "Specialized agent for order and revenue analytics. Handles queries about \
revenue totals, order counts, trends, and fulfillment status.",
    table: "orders",
    columns: &[
        Column {
            description: "primary key",
            ..column("order_id", "UUID")
        },
        Column {
            description: "references customers",
            ..column("customer_id", "UUID")
        },
        Column {
            description: "references products",
            ..column("product_id", "UUID")
        },
        column("quantity", "INTEGER"),
        column("unit_price", "DECIMAL(10, 2)"),
        column("total_amount", "DECIMAL(12, 2)"),
        column("discount", "DECIMAL(5, 2)"),
        column("order_date", "TIMESTAMP WITH TIME ZONE"),
        Column {
            allowed_values: &["pending", "shipped", "delivered", "cancelled"],
            ..column("status", "VARCHAR(50)")
        },
        column("ship_date", "TIMESTAMP WITH TIME ZONE"),
        column("ship_region", "VARCHAR(100)"),
    ],
    skills: &[
        SkillSpec {
            id: "revenue_total",
            name: "Revenue Analysis",
            description: "Calculate total revenue with optional filters by period, status, or region",
            tags: &["revenue", "orders", "aggregation"],
            examples: &[
                "What is our total revenue?",
                "Revenue for Q4 2024",
                "Total revenue from delivered orders",
            ],
        },
        SkillSpec {
            id: "order_trends",
            name: "Order Trends",
            description: "Time-series analysis of order volumes and revenue",
            tags: &["trends", "time-series", "orders"],
            examples: &[
                "Show monthly order counts",
                "Revenue trend over the last 6 months",
            ],
        },
        SkillSpec {
            id: "avg_order_value",
            name: "Average Order Value",
            description: "Calculate average order value with optional grouping",
            tags: &["aov", "orders", "aggregation"],
            examples: &["What is our average order value?"],
        },
        SkillSpec {
            id: "order_status",
            name: "Order Status Analysis",
            description: "Analyze orders by fulfillment status",
            tags: &["status", "orders", "fulfillment"],
            examples: &["How many orders are pending?", "Orders by status"],
        },
    ],
};

//
// ================= Products =================
//

pub static PRODUCTS: TableProfile = TableProfile {
    id: "products",
    name: "Products Data Agent",
    description: "Specialized agent for product catalog analytics. Handles queries about product \
counts, pricing, margins, inventory levels, and category analysis.",
    table: "products",
    columns: &[
        Column {
            description: "primary key",
            ..column("product_id", "UUID")
        },
        Column {
            description: "unique",
            ..column("sku", "VARCHAR(50)")
        },
        column("name", "VARCHAR(255)"),
        Column {
            allowed_values: &["Electronics", "Clothing", "Home & Garden", "Sports", "Books"],
            ..column("category", "VARCHAR(100)")
        },
        column("subcategory", "VARCHAR(100)"),
        column("unit_price", "DECIMAL(10, 2)"),
        column("unit_cost", "DECIMAL(10, 2)"),
        column("stock_quantity", "INTEGER"),
        column("is_active", "BOOLEAN"),
        column("created_at", "TIMESTAMP WITH TIME ZONE"),
        column("updated_at", "TIMESTAMP WITH TIME ZONE"),
    ],
    skills: &[
        SkillSpec {
            id: "product_count",
            name: "Product Catalog Stats",
            description: "Count products by category, status, or other attributes",
            tags: &["count", "products", "catalog"],
            examples: &[
                "How many products do we have?",
                "How many active products in Electronics?",
            ],
        },
        SkillSpec {
            id: "category_stats",
            name: "Category Analysis",
            description: "Analyze products by category with pricing and margin metrics",
            tags: &["category", "pricing", "margin"],
            examples: &[
                "Average price by category",
                "Which category has the highest margin?",
            ],
        },
        SkillSpec {
            id: "inventory_status",
            name: "Inventory Analysis",
            description: "Analyze stock levels and identify low inventory",
            tags: &["inventory", "stock", "products"],
            examples: &["Products with low stock", "Total inventory value"],
        },
        SkillSpec {
            id: "product_search",
            name: "Product Search",
            description: "Search and list products by various criteria",
            tags: &["search", "list", "products"],
            examples: &["List all Electronics products", "Find products priced over $100"],
        },
    ],
};
