use crate::store::{CUSTOMERS_COLUMNS, CUSTOMERS_TABLE};

/// Builds the system instruction, embedding the `customers` schema.
pub fn system_instruction() -> String {
    let columns = CUSTOMERS_COLUMNS
        .iter()
        .map(|(name, ty)| format!("    {} {}", name, ty.as_sql()))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "You are a helpful agent that can query a SQLite database containing customer data.\n\
         These are the columns of the {CUSTOMERS_TABLE} table:\n{columns}\n\
         Use the provided tools to get information about the database schema and data. \
         Only use information from the database. When you call a tool, include the function name \
         and arguments. Do not fabricate information."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_lists_every_column() {
        let prompt = system_instruction();
        assert!(prompt.contains("customers table"));
        for (name, ty) in CUSTOMERS_COLUMNS {
            assert!(prompt.contains(&format!("{} {}", name, ty.as_sql())), "missing {name}");
        }
        assert!(prompt.ends_with("Do not fabricate information."));
    }
}
