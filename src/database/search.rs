use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("Unterminated quote in search")]
    UnterminatedQuote,

    #[error("Invalid id in search term: {0}")]
    InvalidId(String),

    #[error("Search term '{0}' has no value")]
    EmptyValue(String),
}

/// A single search term. Every clause in a query must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Tag(String),
    Deck(String),
    /// `note:` filters by model name
    NoteType(String),
    NoteId(i64),
    CardId(i64),
    /// Substring match on any field
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub negated: bool,
    pub term: Term,
}

/// What the generated SQL selects from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// `notes n`
    Notes,
    /// `cards c JOIN notes n`
    Cards,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlArg {
    Text(String),
    Int(i64),
}

/// A WHERE condition with positional `?` placeholders and their arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlFilter {
    pub condition: String,
    pub args: Vec<SqlArg>,
}

impl SqlFilter {
    /// ` WHERE ...`, or nothing when the query matched everything
    pub fn where_clause(&self) -> String {
        if self.condition.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.condition)
        }
    }
}

/// Parse a search string such as `tag:foo -deck:Spanish "two words"`.
pub fn parse(query: &str) -> Result<Vec<Clause>, SearchError> {
    tokenize(query)?
        .into_iter()
        .map(|token| parse_token(&token))
        .collect()
}

/// Build the SQL condition for `clauses` against `target`.
pub fn to_sql(clauses: &[Clause], target: Target) -> SqlFilter {
    let mut parts = Vec::with_capacity(clauses.len());
    let mut args = Vec::with_capacity(clauses.len());

    for clause in clauses {
        let (sql, arg) = term_sql(&clause.term, target);
        if clause.negated {
            parts.push(format!("NOT ({})", sql));
        } else {
            parts.push(format!("({})", sql));
        }
        args.push(arg);
    }

    SqlFilter {
        condition: parts.join(" AND "),
        args,
    }
}

fn term_sql(term: &Term, target: Target) -> (&'static str, SqlArg) {
    match (term, target) {
        (Term::Tag(tag), _) => (
            r"n.tags LIKE ? ESCAPE '\'",
            SqlArg::Text(format!("% {} %", like_pattern(tag))),
        ),
        (Term::Deck(name), Target::Notes) => (
            r"n.id IN (SELECT nid FROM cards WHERE did IN (SELECT id FROM decks WHERE name LIKE ? ESCAPE '\'))",
            SqlArg::Text(like_pattern(name)),
        ),
        (Term::Deck(name), Target::Cards) => (
            r"c.did IN (SELECT id FROM decks WHERE name LIKE ? ESCAPE '\')",
            SqlArg::Text(like_pattern(name)),
        ),
        (Term::NoteType(name), _) => (
            r"n.mid IN (SELECT id FROM models WHERE name LIKE ? ESCAPE '\')",
            SqlArg::Text(like_pattern(name)),
        ),
        (Term::NoteId(id), _) => ("n.id = ?", SqlArg::Int(*id)),
        (Term::CardId(id), Target::Notes) => {
            ("n.id IN (SELECT nid FROM cards WHERE id = ?)", SqlArg::Int(*id))
        }
        (Term::CardId(id), Target::Cards) => ("c.id = ?", SqlArg::Int(*id)),
        (Term::Text(text), _) => (
            r"n.flds LIKE ? ESCAPE '\'",
            SqlArg::Text(format!("%{}%", like_pattern(text))),
        ),
    }
}

/// Escape LIKE metacharacters and turn `*` into a wildcard.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' | '%' | '_' => {
                pattern.push('\\');
                pattern.push(ch);
            }
            '*' => pattern.push('%'),
            _ => pattern.push(ch),
        }
    }
    pattern
}

fn tokenize(query: &str) -> Result<Vec<String>, SearchError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in query.chars() {
        match ch {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if quoted {
        return Err(SearchError::UnterminatedQuote);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_token(token: &str) -> Result<Clause, SearchError> {
    let (negated, body) = match token.strip_prefix('-') {
        Some(rest) if !rest.is_empty() => (true, rest),
        _ => (false, token),
    };

    let term = match body.split_once(':') {
        Some((key, value)) => match key.to_ascii_lowercase().as_str() {
            "tag" => Term::Tag(non_empty(key, value)?),
            "deck" => Term::Deck(non_empty(key, value)?),
            "note" => Term::NoteType(non_empty(key, value)?),
            "nid" => Term::NoteId(parse_id(body, value)?),
            "cid" => Term::CardId(parse_id(body, value)?),
            _ => Term::Text(body.to_string()),
        },
        None => Term::Text(body.to_string()),
    };

    Ok(Clause { negated, term })
}

fn non_empty(key: &str, value: &str) -> Result<String, SearchError> {
    if value.is_empty() {
        Err(SearchError::EmptyValue(key.to_string()))
    } else {
        Ok(value.to_string())
    }
}

fn parse_id(token: &str, value: &str) -> Result<i64, SearchError> {
    value
        .parse()
        .map_err(|_| SearchError::InvalidId(token.to_string()))
}
