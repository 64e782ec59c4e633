//! The multiregional Supply-Use table on which every stage of the model is built.
//!
//! A [`TableSpecification`] is the raw, unvalidated form of the table as produced by an input
//! adapter. [`EconomicTable::load`] validates it against the declared [`Dimensions`] and produces
//! an immutable table with an entry for every combination of the declared indices.
use crate::error::{MriaError, malformed};
use crate::id::{IDCollection, ProductID, RegionID, SectorID};
use anyhow::{Result, ensure};
use indexmap::IndexSet;
use itertools::iproduct;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

/// The default final demand category
pub const DEFAULT_FINAL_DEMAND_CATEGORY: &str = "FinalD";
/// The default export category
pub const DEFAULT_EXPORT_CATEGORY: &str = "Exports";
/// The default import category
pub const DEFAULT_IMPORT_CATEGORY: &str = "Imports";
/// The default value added category
pub const DEFAULT_VALUE_ADDED_CATEGORY: &str = "VA";

/// The declared regions, sectors, products and accounting categories of a table.
///
/// Iteration over each set follows declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimensions {
    /// All regions
    pub regions: IndexSet<RegionID>,
    /// All sectors
    pub sectors: IndexSet<SectorID>,
    /// All products
    pub products: IndexSet<ProductID>,
    /// Columns of the Use table which represent final demand rather than a sector
    pub final_demand_categories: IndexSet<String>,
    /// Categories of exports to the rest of the world
    pub export_categories: IndexSet<String>,
    /// Categories of imports from the rest of the world
    pub import_categories: IndexSet<String>,
    /// Categories of value added
    pub value_added_categories: IndexSet<String>,
}

impl Dimensions {
    /// Create [`Dimensions`] with the default accounting categories
    pub fn new(
        regions: IndexSet<RegionID>,
        sectors: IndexSet<SectorID>,
        products: IndexSet<ProductID>,
    ) -> Self {
        let single = |s: &str| IndexSet::from([s.to_string()]);
        Self {
            regions,
            sectors,
            products,
            final_demand_categories: single(DEFAULT_FINAL_DEMAND_CATEGORY),
            export_categories: single(DEFAULT_EXPORT_CATEGORY),
            import_categories: single(DEFAULT_IMPORT_CATEGORY),
            value_added_categories: single(DEFAULT_VALUE_ADDED_CATEGORY),
        }
    }

    /// Iterate over every (region, sector) pair
    pub fn iter_region_sectors(&self) -> impl Iterator<Item = (&RegionID, &SectorID)> {
        iproduct!(self.regions.iter(), self.sectors.iter())
    }

    /// Iterate over every (region, product) pair
    pub fn iter_region_products(&self) -> impl Iterator<Item = (&RegionID, &ProductID)> {
        iproduct!(self.regions.iter(), self.products.iter())
    }

    /// Check that the sets are non-empty and that no category name clashes with a sector
    fn validate(&self) -> Result<()> {
        ensure!(!self.regions.is_empty(), malformed("No regions declared"));
        ensure!(!self.sectors.is_empty(), malformed("No sectors declared"));
        ensure!(!self.products.is_empty(), malformed("No products declared"));
        ensure!(
            !self.final_demand_categories.is_empty(),
            malformed("No final demand categories declared")
        );
        ensure!(
            !self.export_categories.is_empty(),
            malformed("No export categories declared")
        );

        for category in &self.final_demand_categories {
            ensure!(
                !self.sectors.contains(category.as_str()),
                malformed(format!(
                    "Final demand category {category} has the same name as a sector"
                ))
            );
        }

        Ok(())
    }
}

/// A column of the Use table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UseColumn {
    /// Intermediate use by a sector
    Sector(SectorID),
    /// Use by a final demand category
    FinalDemand(String),
}

/// A raw entry of the Supply table: `region`'s `sector` supplies `value` of `product` to
/// `to_region`
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyEntry {
    /// Supplying region
    pub region: String,
    /// Supplying sector
    pub sector: String,
    /// Receiving region
    pub to_region: String,
    /// Product supplied
    pub product: String,
    /// Amount supplied
    pub value: f64,
}

/// A raw entry of the Use table: `value` of `region`'s `product` is used by `column` in
/// `to_region`
#[derive(Debug, Clone, PartialEq)]
pub struct UseEntry {
    /// Region the product comes from
    pub region: String,
    /// Product used
    pub product: String,
    /// Region of the user
    pub to_region: String,
    /// A sector or final demand category
    pub column: String,
    /// Amount used
    pub value: f64,
}

/// A raw entry of a table indexed by region, an item (sector or product) and a category.
///
/// Used for the Value Added (items are sectors), Export and Import (items are products) tables.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryEntry {
    /// Region
    pub region: String,
    /// Sector or product
    pub item: String,
    /// Accounting category
    pub category: String,
    /// Amount
    pub value: f64,
}

/// The raw contents of a Supply-Use table, as supplied by an input adapter
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpecification {
    /// The declared index sets
    pub dimensions: Dimensions,
    /// Entries of the Supply table
    pub supply: Vec<SupplyEntry>,
    /// Entries of the Use table
    pub uses: Vec<UseEntry>,
    /// Entries of the Value Added table
    pub value_added: Vec<CategoryEntry>,
    /// Entries of the Export-to-rest-of-world table
    pub exports: Vec<CategoryEntry>,
    /// Entries of the Import-from-rest-of-world table
    pub imports: Vec<CategoryEntry>,
}

type SupplyKey = (RegionID, SectorID, RegionID, ProductID);
type UseKey = (RegionID, ProductID, RegionID, UseColumn);

/// An immutable, validated multiregional Supply-Use table
#[derive(Debug, Clone, PartialEq)]
pub struct EconomicTable {
    dimensions: Dimensions,
    supply: HashMap<SupplyKey, f64>,
    uses: HashMap<UseKey, f64>,
    value_added: HashMap<(RegionID, SectorID, String), f64>,
    exports: HashMap<(RegionID, ProductID, String), f64>,
    imports: HashMap<(RegionID, ProductID, String), f64>,
}

impl EconomicTable {
    /// Validate a [`TableSpecification`] and build the table from it.
    ///
    /// # Returns
    ///
    /// The table or an [`MriaError::MalformedTable`] if an entry refers to an undeclared index,
    /// is duplicated or has an invalid value, or if any combination of declared indices is
    /// missing from one of the five tables.
    pub fn load(spec: TableSpecification) -> Result<Self> {
        let TableSpecification {
            dimensions: dims,
            supply,
            uses,
            value_added,
            exports,
            imports,
        } = spec;
        dims.validate()?;

        let supply = load_supply(&dims, &supply)?;
        let uses = load_uses(&dims, &uses)?;
        let value_added = load_category_table(
            "value added",
            &value_added,
            &dims.regions,
            &dims.sectors,
            &dims.value_added_categories,
        )?;
        let exports = load_category_table(
            "export",
            &exports,
            &dims.regions,
            &dims.products,
            &dims.export_categories,
        )?;
        let imports = load_category_table(
            "import",
            &imports,
            &dims.regions,
            &dims.products,
            &dims.import_categories,
        )?;

        Ok(Self {
            dimensions: dims,
            supply,
            uses,
            value_added,
            exports,
            imports,
        })
    }

    /// The declared index sets
    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    /// Absolute supply of `product` by `sector` in `region` to `to_region`
    pub fn supply(
        &self,
        region: &RegionID,
        sector: &SectorID,
        to_region: &RegionID,
        product: &ProductID,
    ) -> f64 {
        // NB: All combinations were checked on load
        self.supply[&(
            region.clone(),
            sector.clone(),
            to_region.clone(),
            product.clone(),
        )]
    }

    /// Absolute use of `region`'s `product` by `column` in `to_region`
    pub fn use_value(
        &self,
        region: &RegionID,
        product: &ProductID,
        to_region: &RegionID,
        column: &UseColumn,
    ) -> f64 {
        self.uses[&(
            region.clone(),
            product.clone(),
            to_region.clone(),
            column.clone(),
        )]
    }

    /// Absolute intermediate use of `region`'s `product` by `sector` in `to_region`
    pub fn intermediate_use(
        &self,
        region: &RegionID,
        product: &ProductID,
        to_region: &RegionID,
        sector: &SectorID,
    ) -> f64 {
        self.use_value(region, product, to_region, &UseColumn::Sector(sector.clone()))
    }

    /// Value added of the given category for a region-sector
    pub fn value_added(&self, region: &RegionID, sector: &SectorID, category: &str) -> f64 {
        self.value_added[&(region.clone(), sector.clone(), category.to_string())]
    }

    /// Total value added over all categories for a region-sector
    pub fn total_value_added(&self, region: &RegionID, sector: &SectorID) -> f64 {
        self.dimensions
            .value_added_categories
            .iter()
            .map(|category| self.value_added(region, sector, category))
            .sum()
    }

    /// Exports of the given category to the rest of the world
    pub fn export(&self, region: &RegionID, product: &ProductID, category: &str) -> f64 {
        self.exports[&(region.clone(), product.clone(), category.to_string())]
    }

    /// Imports of the given category from the rest of the world
    pub fn import(&self, region: &RegionID, product: &ProductID, category: &str) -> f64 {
        self.imports[&(region.clone(), product.clone(), category.to_string())]
    }

    /// Imports of `region`'s `product` from the rest of the world, summed over import categories
    pub fn total_imports(&self, region: &RegionID, product: &ProductID) -> f64 {
        self.dimensions
            .import_categories
            .iter()
            .map(|category| self.import(region, product, category))
            .sum()
    }

    /// Final demand for `region`'s `product`, summed over all using regions and final demand
    /// categories
    pub fn final_demand(&self, region: &RegionID, product: &ProductID) -> f64 {
        iproduct!(
            self.dimensions.regions.iter(),
            self.dimensions.final_demand_categories.iter()
        )
        .map(|(to_region, category)| {
            self.use_value(
                region,
                product,
                to_region,
                &UseColumn::FinalDemand(category.clone()),
            )
        })
        .sum()
    }

    /// Exports of `region`'s `product` to the rest of the world, summed over export categories
    pub fn total_exports(&self, region: &RegionID, product: &ProductID) -> f64 {
        self.dimensions
            .export_categories
            .iter()
            .map(|category| self.export(region, product, category))
            .sum()
    }
}

/// Check a value is finite and, optionally, non-negative
fn check_value(value: f64, non_negative: bool, describe: impl Fn() -> String) -> Result<()> {
    ensure!(
        value.is_finite(),
        malformed(format!("Non-finite value for {}", describe()))
    );
    if non_negative {
        ensure!(
            value >= 0.0,
            malformed(format!("Negative value {value} for {}", describe()))
        );
    }

    Ok(())
}

/// Look up an ID, converting a failure into an [`MriaError::MalformedTable`]
fn resolve<ID>(ids: &IndexSet<ID>, id: &str, table: &str) -> Result<ID>
where
    ID: crate::id::IDLike,
{
    ids.get_id(id)
        .map_err(|err| MriaError::MalformedTable(format!("{table} table: {err}")).into())
}

/// Insert a value, raising an error if the key is already present
fn insert_unique<K>(map: &mut HashMap<K, f64>, key: K, value: f64, table: &str) -> Result<()>
where
    K: Eq + Hash + std::fmt::Debug,
{
    let existing = map.insert(key, value);
    ensure!(
        existing.is_none(),
        malformed(format!("{table} table: duplicate entry"))
    );

    Ok(())
}

/// Check that every expected key is present in the map
fn check_complete<K, I>(map: &HashMap<K, f64>, expected: I, table: &str) -> Result<()>
where
    K: Eq + Hash + std::fmt::Debug,
    I: Iterator<Item = K>,
{
    let missing: Vec<K> = expected.filter(|key| !map.contains_key(key)).collect();
    ensure!(
        missing.is_empty(),
        malformed(format!(
            "{table} table is missing {} entries, e.g. {:?}",
            missing.len(),
            missing[0]
        ))
    );

    Ok(())
}

fn load_supply(dims: &Dimensions, entries: &[SupplyEntry]) -> Result<HashMap<SupplyKey, f64>> {
    let mut map = HashMap::with_capacity(entries.len());
    for entry in entries {
        let key = (
            resolve(&dims.regions, &entry.region, "Supply")?,
            resolve(&dims.sectors, &entry.sector, "Supply")?,
            resolve(&dims.regions, &entry.to_region, "Supply")?,
            resolve(&dims.products, &entry.product, "Supply")?,
        );
        check_value(entry.value, true, || format!("Supply entry {key:?}"))?;
        insert_unique(&mut map, key, entry.value, "Supply")?;
    }

    let expected = iproduct!(
        dims.regions.iter(),
        dims.sectors.iter(),
        dims.regions.iter(),
        dims.products.iter()
    )
    .map(|(r, s, rb, p)| (r.clone(), s.clone(), rb.clone(), p.clone()));
    check_complete(&map, expected, "Supply")?;

    Ok(map)
}

fn load_uses(dims: &Dimensions, entries: &[UseEntry]) -> Result<HashMap<UseKey, f64>> {
    let mut map = HashMap::with_capacity(entries.len());
    for entry in entries {
        let column = if dims.final_demand_categories.contains(&entry.column) {
            UseColumn::FinalDemand(entry.column.clone())
        } else {
            UseColumn::Sector(resolve(&dims.sectors, &entry.column, "Use")?)
        };
        let key = (
            resolve(&dims.regions, &entry.region, "Use")?,
            resolve(&dims.products, &entry.product, "Use")?,
            resolve(&dims.regions, &entry.to_region, "Use")?,
            column,
        );

        // Final demand may legitimately be negative (e.g. inventory changes)
        let non_negative = matches!(key.3, UseColumn::Sector(_));
        check_value(entry.value, non_negative, || format!("Use entry {key:?}"))?;
        insert_unique(&mut map, key, entry.value, "Use")?;
    }

    let columns: Vec<UseColumn> = dims
        .sectors
        .iter()
        .cloned()
        .map(UseColumn::Sector)
        .chain(
            dims.final_demand_categories
                .iter()
                .cloned()
                .map(UseColumn::FinalDemand),
        )
        .collect();
    let expected = iproduct!(
        dims.regions.iter(),
        dims.products.iter(),
        dims.regions.iter(),
        columns.iter()
    )
    .map(|(r, p, rb, col)| (r.clone(), p.clone(), rb.clone(), col.clone()));
    check_complete(&map, expected, "Use")?;

    Ok(map)
}

fn load_category_table<ID>(
    table: &str,
    entries: &[CategoryEntry],
    regions: &IndexSet<RegionID>,
    items: &IndexSet<ID>,
    categories: &IndexSet<String>,
) -> Result<HashMap<(RegionID, ID, String), f64>>
where
    ID: crate::id::IDLike + std::fmt::Debug + Display,
{
    let mut map = HashMap::with_capacity(entries.len());
    for entry in entries {
        ensure!(
            categories.contains(&entry.category),
            malformed(format!(
                "{table} table: unknown category {}",
                entry.category
            ))
        );
        let key = (
            resolve(regions, &entry.region, table)?,
            resolve(items, &entry.item, table)?,
            entry.category.clone(),
        );
        check_value(entry.value, false, || format!("{table} entry {key:?}"))?;
        insert_unique(&mut map, key, entry.value, table)?;
    }

    let expected = iproduct!(regions.iter(), items.iter(), categories.iter())
        .map(|(r, item, category)| (r.clone(), item.clone(), category.clone()));
    check_complete(&map, expected, table)?;

    Ok(map)
}
