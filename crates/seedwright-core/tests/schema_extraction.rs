use seedwright_core::{
    ForeignKey, Schema, SchemaWarning, SemanticType, load_schema, normalize_statements,
    parse_schema,
};

const SHOP: &str = r#"
-- storefront schema
CREATE TABLE IF NOT EXISTS customers (
    id SERIAL PRIMARY KEY,
    email VARCHAR(255) NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    tier VARCHAR(10) DEFAULT 'basic' CHECK (tier IN ('basic', 'gold', 'platinum')),
    created_at TIMESTAMP NOT NULL DEFAULT now()
);

/* orders reference customers */
CREATE TABLE orders (
    id BIGSERIAL,
    customer_id INTEGER NOT NULL,
    total NUMERIC(12, 2) NOT NULL,
    paid BOOLEAN DEFAULT false,
    note TEXT DEFAULT 'NOT NULL',
    CONSTRAINT orders_pk PRIMARY KEY (id),
    CONSTRAINT orders_customer_fk FOREIGN KEY (customer_id) REFERENCES customers(id)
);

CREATE TABLE order_items (
    id SERIAL PRIMARY KEY,
    order_id BIGINT REFERENCES orders(id),
    sku CHAR(8) NOT NULL,
    quantity INT NOT NULL CHECK (quantity > 0),
    gap INTERVAL
);
"#;

#[test]
fn extracts_tables_columns_and_order() {
    let schema = parse_schema(SHOP);
    let names: Vec<&str> = schema.tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["customers", "orders", "order_items"]);
    assert_eq!(schema.insert_order(), ["customers", "orders", "order_items"]);

    let customers = schema.require_table("customers").expect("customers");
    let tier = customers.column("tier").expect("tier");
    assert_eq!(
        tier.allowed_values,
        Some(vec![
            "basic".to_string(),
            "gold".to_string(),
            "platinum".to_string()
        ])
    );
    assert_eq!(tier.max_length, Some(10));
    assert!(!tier.not_null);
    assert_eq!(
        customers.column("created_at").expect("created_at").semantic_type,
        SemanticType::Timestamp
    );

    let orders = schema.require_table("orders").expect("orders");
    assert!(orders.column("id").expect("id").is_auto_generated());
    assert_eq!(
        orders.column("customer_id").and_then(|c| c.foreign_key.clone()),
        Some(ForeignKey::new("customers", "id"))
    );
    assert_eq!(
        orders.column("total").expect("total").semantic_type,
        SemanticType::Decimal
    );
    assert_eq!(
        orders.column("paid").expect("paid").semantic_type,
        SemanticType::Boolean
    );
    assert!(!orders.column("note").expect("note").not_null);

    let generated: Vec<&str> = orders
        .non_auto_columns()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(generated, vec!["customer_id", "total", "paid", "note"]);

    let items = schema.require_table("order_items").expect("order_items");
    assert_eq!(
        items.column("gap").expect("gap").semantic_type,
        SemanticType::Text
    );
    assert_eq!(
        items.column("order_id").expect("order_id").semantic_type,
        SemanticType::Integer
    );
    assert_eq!(schema.depends_on("order_items"), vec!["orders"]);
}

#[test]
fn non_enumeration_checks_are_reported_not_fatal() {
    let schema = parse_schema(SHOP);
    let items = schema.require_table("order_items").expect("order_items");
    assert!(items.column("quantity").expect("quantity").not_null);
    assert!(items.column("quantity").expect("quantity").allowed_values.is_none());
    assert!(schema.warnings().iter().any(|warning| matches!(
        warning,
        SchemaWarning::UnsupportedClause { table, .. } if table == "order_items"
    )));
}

#[test]
fn order_is_topological_for_every_reference() {
    let schema = parse_schema(
        "CREATE TABLE reviews (id INT, product_id INT REFERENCES products(id), author_id INT REFERENCES users(id));
         CREATE TABLE products (id INT, vendor_id INT REFERENCES vendors(id), category_id INT REFERENCES categories(id));
         CREATE TABLE categories (id INT, parent_id INT REFERENCES categories(id));
         CREATE TABLE users (id INT);
         CREATE TABLE vendors (id INT, owner_id INT REFERENCES users(id));",
    );
    let order = schema.insert_order();
    let position = |name: &str| order.iter().position(|item| item == name).expect(name);

    for table in schema.tables() {
        for target in table.depends_on() {
            assert!(
                position(target.as_str()) < position(table.name.as_str()),
                "{target} must precede {}",
                table.name
            );
        }
    }
    assert_eq!(order.len(), 5);
}

#[test]
fn two_table_example_orders_referenced_first() {
    let schema = parse_schema(
        "create table authors (id int primary key);\ncreate table books (id int primary key, author_id int references authors(id));",
    );
    assert_eq!(schema.insert_order(), ["authors", "books"]);
}

#[test]
fn normalizing_twice_is_stable_and_parses_the_same() {
    let once = normalize_statements(SHOP);
    assert_eq!(normalize_statements(&once), once);
    let from_raw = parse_schema(SHOP);
    let from_normalized = parse_schema(&once);
    assert_eq!(from_raw.tables(), from_normalized.tables());
}

#[test]
fn empty_input_yields_empty_schema() {
    let schema = parse_schema("");
    assert!(schema.is_empty());
    assert!(schema.insert_order().is_empty());
    assert!(schema.warnings().is_empty());
    assert!(Schema::parse("-- nothing here\n\n").is_empty());
}

#[test]
fn truncated_schema_keeps_completed_columns() {
    let schema = parse_schema(
        "CREATE TABLE a (id INT PRIMARY KEY, label TEXT NOT NULL);\nCREATE TABLE b (id INT PRIMARY KEY, a_id INT REFERENCES a(id), title VARCHAR(",
    );
    let b = schema.require_table("b").expect("b");
    assert_eq!(
        b.column("a_id").and_then(|c| c.foreign_key.clone()),
        Some(ForeignKey::new("a", "id"))
    );
    assert_eq!(schema.insert_order(), ["a", "b"]);
    assert!(schema.warnings().iter().any(|warning| warning.code() == "unterminated_body"));
}

#[test]
fn load_schema_reads_files() {
    let dir = std::env::temp_dir().join(format!("seedwright_core_{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join("schema.sql");
    std::fs::write(&path, SHOP).expect("write schema");

    let schema = load_schema(&path).expect("load schema");
    assert_eq!(schema.tables().len(), 3);

    let missing = load_schema(dir.join("missing.sql"));
    assert!(missing.is_err());
    std::fs::remove_dir_all(&dir).ok();
}
