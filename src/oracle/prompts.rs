// Prompt text for each oracle call the pipeline makes. Builders return a
// ready `OracleRequest`; response shapes live next to their callers.

use super::OracleRequest;

/// Appended to every instruction that expects a JSON answer.
pub const JSON_ONLY: &str = "Respond with a single JSON document only. \
    Do not add explanations or any text outside the JSON.";

pub const CANONICAL_COLUMNS: [&str; 4] = ["Date", "Description", "Credit", "Debit"];

const CATEGORY_SAMPLE: &str = r#"{"type": 1}"#;

const CATEGORY_MAPPING: &str = "\
MAPPING EXPLANATION:
1 => The transaction table has well defined, distinct and full grid lines separating every transaction entry, cell and column.
2 => The transaction table has very sparse grid lines, if any at all.
3 => The document fits neither of the above: few transactions, and a lot of text unrelated to the transaction table.

MAPPING GUIDE:
{\"Zenith Bank\": 1, \"Guaranty Trust Bank (GT Bank)\": 1, \"Wema Bank\": 2, \"Royal Bank of Canada\": 3}";

const COLUMNS_SAMPLE: &str = r#"{"columns": ["Trans. Date", "Narration", "Money In", "Money Out"]}"#;

const TABLE_SAMPLE: &str = r#"{"Date": ["03-10-2022", "12-10-2022"], "Description": ["Opening Balance", "Deposit interest"], "Credit": ["", "0.64"], "Debit": ["", ""]}"#;

const GAMBLING_SAMPLE: &str =
    r#"{"gambling": true, "area_found": [{"index": 23, "description": "Bet9ja stake"}]}"#;

pub fn classify_layout(image_url: &str) -> OracleRequest {
    let message = format!(
        "Return a JSON document stating which category this bank statement belongs to, \
         using the mapping below as a guide.\n\n{CATEGORY_MAPPING}\n\n\
         SAMPLE RESPONSE FORMAT:\n{CATEGORY_SAMPLE}"
    );
    OracleRequest::text(JSON_ONLY, message)
        .with_image(image_url)
        .max_tokens(300)
}

/// Asks for the statement's own transaction-table header names.
pub fn discover_columns(image_url: &str) -> OracleRequest {
    let message = format!(
        "Return a JSON document of the column names in the transactions table, \
         exactly as printed, in left-to-right order, using the sample format as a guide.\n\n\
         SAMPLE FORMAT:\n{COLUMNS_SAMPLE}"
    );
    OracleRequest::text(JSON_ONLY, message)
        .with_image(image_url)
        .max_tokens(300)
}

/// Asks for a bank's header list to be mapped onto the canonical columns.
pub fn swap_columns(header_columns: &[String]) -> OracleRequest {
    let instruction = format!(
        "These two lists hold column names of different transaction tables. Map List 1 to \
         List 2 by finding the columns that correspond to each other by content or purpose. \
         Answer with the List 2 names rearranged to follow the order of List 1, using an \
         empty string where List 2 has no equivalent.\n\n\
         Structure the answer with 'columns' as the key and the list of names as the value.\n\n\
         EXAMPLE:\n{{\"columns\": {CANONICAL_COLUMNS:?}}}\n\n{JSON_ONLY}"
    );
    let message = format!("LIST 1:\n{CANONICAL_COLUMNS:?}\n\nLIST 2:\n{header_columns:?}");
    OracleRequest::text(instruction, message).json()
}

pub fn vision_table(image_url: &str) -> OracleRequest {
    let message = format!(
        "Return a JSON document of the transactions table using the sample format as a guide. \
         Each key maps to a list with one entry per transaction row, all lists the same length. \
         Write \"Not Visible\" for cells you cannot read. \
         Follow the day-month-year date format.\n\n\
         SAMPLE FORMAT:\n{TABLE_SAMPLE}"
    );
    OracleRequest::text(JSON_ONLY, message)
        .with_image(image_url)
        .max_tokens(4096)
}

/// Second pass over a vision table: keep the canonical columns, drop balance rows.
pub fn refine_table(raw_table_json: &str) -> OracleRequest {
    let instruction = format!(
        "Given the transaction details, select the data of the required columns from the \
         entire set of transactions and answer in the required format. Remove the Opening \
         Balance and Closing Balance records.\n\n\
         Here is how the information should be structured:\n\nEXAMPLE:\n{TABLE_SAMPLE}\n\n{JSON_ONLY}"
    );
    let message = format!(
        "TRANSACTION DETAILS:\n{raw_table_json}\n\n\
         REQUIRED COLUMNS OR EQUIVALENT:\n{CANONICAL_COLUMNS:?}"
    );
    OracleRequest::text(instruction, message).json()
}

/// `indexed_descriptions` is one `index: description` line per row.
pub fn gambling_check(indexed_descriptions: &str) -> OracleRequest {
    let instruction = format!(
        "You review bank transactions. Decide whether any of the numbered transaction \
         descriptions is a gambling activity (betting, casinos, lotteries, sportsbooks). \
         Report every such transaction with its index and description. When there are none, \
         answer {{\"gambling\": false, \"area_found\": []}}.\n\n\
         EXAMPLE:\n{GAMBLING_SAMPLE}\n\n{JSON_ONLY}"
    );
    OracleRequest::text(instruction, format!("TRANSACTIONS:\n{indexed_descriptions}")).json()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_prompts_carry_the_image() {
        let url = "data:image/jpeg;base64,AA";
        for request in [classify_layout(url), discover_columns(url), vision_table(url)] {
            assert_eq!(request.image_url.as_deref(), Some(url));
        }
    }

    #[test]
    fn swap_columns_lists_both_header_sets() {
        let request = swap_columns(&["Txn Date".to_string(), "Remarks".to_string()]);
        assert!(request.json_mode);
        assert!(request.message.contains("\"Txn Date\""));
        assert!(request.message.contains("\"Description\""));
    }
}
