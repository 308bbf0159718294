//! nom grammar for the nGQL subset the in-memory graph understands.

use chrono::NaiveDateTime;
use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, tag, tag_no_case};
use nom::character::complete::{
    alpha1, alphanumeric1, char, digit0, digit1, multispace0, none_of, one_of, satisfy,
};
use nom::combinator::{all_consuming, map, map_res, not, opt, recognize, value};
use nom::multi::{many0_count, separated_list0, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;

use graphmap_core::{ScalarKind, Value, VidType};

/// Tag or edge type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Tag,
    Edge,
}

/// One property of a tag or edge type.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    pub name: String,
    pub kind: ScalarKind,
    pub default: Option<Value>,
}

/// An indexed property and its optional prefix length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexField {
    pub name: String,
    pub length: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Use(String),
    CreateSpace {
        name: String,
        if_not_exists: bool,
        partition_num: u32,
        replica_factor: u32,
        vid_type: VidType,
    },
    ShowSpaces,
    DropSpace {
        name: String,
        if_exists: bool,
    },
    CreateSchema {
        kind: SchemaKind,
        name: String,
        if_not_exists: bool,
        properties: Vec<PropertyDef>,
    },
    ShowSchemas(SchemaKind),
    DropSchema {
        kind: SchemaKind,
        name: String,
        if_exists: bool,
    },
    CreateIndex {
        kind: SchemaKind,
        name: String,
        if_not_exists: bool,
        schema: String,
        fields: Vec<IndexField>,
    },
    InsertVertex {
        if_not_exists: bool,
        tag: String,
        fields: Vec<String>,
        rows: Vec<(String, Vec<Value>)>,
    },
    InsertEdge {
        if_not_exists: bool,
        edge: String,
        fields: Vec<String>,
        rows: Vec<(String, String, Vec<Value>)>,
    },
    UpdateVertex {
        tag: String,
        vid: String,
        assignments: Vec<(String, Value)>,
    },
    MatchTag(String),
    MatchId(String),
}

/// Parse one statement. A trailing `;` is accepted.
pub fn parse_statement(input: &str) -> Result<Statement, String> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed);
    all_consuming(terminated(statement, multispace0))(trimmed)
        .map(|(_, stmt)| stmt)
        .map_err(|e| syntax_error(trimmed, e))
}

/// Parse one value literal, as produced by the literal formatter.
pub fn parse_literal(input: &str) -> Result<Value, String> {
    all_consuming(terminated(literal, multispace0))(input)
        .map(|(_, v)| v)
        .map_err(|e| syntax_error(input, e))
}

fn syntax_error(input: &str, e: nom::Err<nom::error::Error<&str>>) -> String {
    let near = match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
        nom::Err::Incomplete(_) => "",
    };
    if near.is_empty() {
        format!("SyntaxError: syntax error at end of input `{input}`")
    } else {
        format!("SyntaxError: syntax error near `{near}`")
    }
}

// ── Tokens ───────────────────────────────────────────────────────

/// Case-insensitive keyword, not followed by an identifier character.
fn kw<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    preceded(
        multispace0,
        terminated(
            tag_no_case(word),
            not(satisfy(|c: char| c.is_alphanumeric() || c == '_')),
        ),
    )
}

fn sym<'a>(c: char) -> impl FnMut(&'a str) -> IResult<&'a str, char> {
    preceded(multispace0, char(c))
}

fn identifier(input: &str) -> IResult<&str, String> {
    map(
        preceded(
            multispace0,
            recognize(pair(
                alt((alpha1, tag("_"))),
                many0_count(alt((alphanumeric1, tag("_")))),
            )),
        ),
        str::to_string,
    )(input)
}

fn uint(input: &str) -> IResult<&str, u32> {
    map_res(preceded(multispace0, digit1), str::parse::<u32>)(input)
}

fn if_not_exists(input: &str) -> IResult<&str, bool> {
    map(opt(tuple((kw("IF"), kw("NOT"), kw("EXISTS")))), |o| o.is_some())(input)
}

fn if_exists(input: &str) -> IResult<&str, bool> {
    map(opt(pair(kw("IF"), kw("EXISTS"))), |o| o.is_some())(input)
}

fn parens<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<O>>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(sym('('), separated_list0(sym(','), inner), sym(')'))
}

// ── Literals ─────────────────────────────────────────────────────

fn literal(input: &str) -> IResult<&str, Value> {
    preceded(
        multispace0,
        alt((
            value(Value::Null, kw("NULL")),
            value(Value::Bool(true), kw("true")),
            value(Value::Bool(false), kw("false")),
            map(datetime, Value::Timestamp),
            map(quoted('"'), Value::String),
            map(quoted('\''), Value::String),
            number,
        )),
    )(input)
}

fn datetime(input: &str) -> IResult<&str, NaiveDateTime> {
    map_res(
        preceded(
            kw("datetime"),
            delimited(sym('('), preceded(multispace0, quoted('"')), sym(')')),
        ),
        |text: String| NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f"),
    )(input)
}

fn quoted<'a>(delimiter: char) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    let plain = if delimiter == '"' { "\\\"" } else { "\\'" };
    move |input: &'a str| {
        let body = escaped_transform(
            none_of(plain),
            '\\',
            alt((
                value("\\", tag("\\")),
                value("\"", tag("\"")),
                value("'", tag("'")),
                value("\n", tag("n")),
                value("\r", tag("r")),
                value("\t", tag("t")),
            )),
        );
        // escaped_transform rejects empty input, so an empty body is optional.
        map(
            delimited(char(delimiter), opt(body), char(delimiter)),
            Option::unwrap_or_default,
        )(input)
    }
}

fn number(input: &str) -> IResult<&str, Value> {
    map_res(
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(pair(char('.'), digit0)),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |text: &str| {
            if text.contains(['.', 'e', 'E']) {
                text.parse::<f64>().map(Value::Float).map_err(|e| e.to_string())
            } else {
                text.parse::<i64>().map(Value::Int).map_err(|e| e.to_string())
            }
        },
    )(input)
}

/// A vertex id: a quoted string or an integer.
fn vid(input: &str) -> IResult<&str, String> {
    preceded(
        multispace0,
        alt((
            quoted('"'),
            quoted('\''),
            map(recognize(pair(opt(char('-')), digit1)), str::to_string),
        )),
    )(input)
}

fn scalar_kind(input: &str) -> IResult<&str, ScalarKind> {
    alt((
        value(ScalarKind::Int, alt((kw("int64"), kw("int32"), kw("int")))),
        value(ScalarKind::Float, alt((kw("float"), kw("double")))),
        value(ScalarKind::String, kw("string")),
        value(
            ScalarKind::String,
            tuple((kw("fixed_string"), sym('('), uint, sym(')'))),
        ),
        value(ScalarKind::Bool, kw("bool")),
        value(ScalarKind::Timestamp, alt((kw("datetime"), kw("timestamp")))),
    ))(input)
}

fn vid_type(input: &str) -> IResult<&str, VidType> {
    alt((
        value(VidType::Int64, alt((kw("INT64"), kw("INT")))),
        map(
            preceded(pair(kw("FIXED_STRING"), sym('(')), terminated(uint, sym(')'))),
            VidType::FixedString,
        ),
    ))(input)
}

// ── Statements ───────────────────────────────────────────────────

fn statement(input: &str) -> IResult<&str, Statement> {
    alt((
        map(preceded(kw("USE"), identifier), Statement::Use),
        preceded(kw("CREATE"), alt((create_space, create_index, create_schema))),
        preceded(kw("SHOW"), show_statement),
        preceded(kw("DROP"), drop_statement),
        preceded(kw("INSERT"), alt((insert_vertex, insert_edge))),
        update_vertex,
        match_query,
    ))(input)
}

enum SpaceOption {
    PartitionNum(u32),
    ReplicaFactor(u32),
    VidType(VidType),
}

fn space_option(input: &str) -> IResult<&str, SpaceOption> {
    alt((
        map(
            preceded(pair(kw("partition_num"), sym('=')), uint),
            SpaceOption::PartitionNum,
        ),
        map(
            preceded(pair(kw("replica_factor"), sym('=')), uint),
            SpaceOption::ReplicaFactor,
        ),
        map(
            preceded(pair(kw("vid_type"), sym('=')), vid_type),
            SpaceOption::VidType,
        ),
    ))(input)
}

fn create_space(input: &str) -> IResult<&str, Statement> {
    let (input, _) = kw("SPACE")(input)?;
    let (input, if_not_exists) = if_not_exists(input)?;
    let (input, name) = identifier(input)?;
    let (input, options) = opt(parens(space_option))(input)?;

    let mut partition_num = 100;
    let mut replica_factor = 1;
    let mut vid = VidType::FixedString(8);
    for option in options.unwrap_or_default() {
        match option {
            SpaceOption::PartitionNum(n) => partition_num = n,
            SpaceOption::ReplicaFactor(n) => replica_factor = n,
            SpaceOption::VidType(v) => vid = v,
        }
    }
    Ok((
        input,
        Statement::CreateSpace {
            name,
            if_not_exists,
            partition_num,
            replica_factor,
            vid_type: vid,
        },
    ))
}

fn schema_kind(input: &str) -> IResult<&str, SchemaKind> {
    alt((
        value(SchemaKind::Tag, kw("TAG")),
        value(SchemaKind::Edge, kw("EDGE")),
    ))(input)
}

fn property_def(input: &str) -> IResult<&str, PropertyDef> {
    map(
        tuple((identifier, scalar_kind, opt(preceded(kw("DEFAULT"), literal)))),
        |(name, kind, default)| PropertyDef {
            name,
            kind,
            default,
        },
    )(input)
}

fn create_schema(input: &str) -> IResult<&str, Statement> {
    map(
        tuple((schema_kind, if_not_exists, identifier, parens(property_def))),
        |(kind, if_not_exists, name, properties)| Statement::CreateSchema {
            kind,
            name,
            if_not_exists,
            properties,
        },
    )(input)
}

fn create_index(input: &str) -> IResult<&str, Statement> {
    let index_field = map(
        pair(identifier, opt(delimited(sym('('), uint, sym(')')))),
        |(name, length)| IndexField { name, length },
    );
    map(
        tuple((
            terminated(schema_kind, kw("INDEX")),
            if_not_exists,
            identifier,
            preceded(kw("ON"), identifier),
            parens(index_field),
        )),
        |(kind, if_not_exists, name, schema, fields)| Statement::CreateIndex {
            kind,
            name,
            if_not_exists,
            schema,
            fields,
        },
    )(input)
}

fn show_statement(input: &str) -> IResult<&str, Statement> {
    alt((
        value(Statement::ShowSpaces, kw("SPACES")),
        value(Statement::ShowSchemas(SchemaKind::Tag), kw("TAGS")),
        value(Statement::ShowSchemas(SchemaKind::Edge), kw("EDGES")),
    ))(input)
}

fn drop_statement(input: &str) -> IResult<&str, Statement> {
    alt((
        map(
            tuple((kw("SPACE"), if_exists, identifier)),
            |(_, if_exists, name)| Statement::DropSpace { name, if_exists },
        ),
        map(
            tuple((schema_kind, if_exists, identifier)),
            |(kind, if_exists, name)| Statement::DropSchema {
                kind,
                name,
                if_exists,
            },
        ),
    ))(input)
}

fn insert_vertex(input: &str) -> IResult<&str, Statement> {
    let row = pair(vid, preceded(sym(':'), parens(literal)));
    map(
        tuple((
            preceded(kw("VERTEX"), if_not_exists),
            identifier,
            parens(identifier),
            preceded(kw("VALUES"), separated_list1(sym(','), row)),
        )),
        |(if_not_exists, tag, fields, rows)| Statement::InsertVertex {
            if_not_exists,
            tag,
            fields,
            rows,
        },
    )(input)
}

fn insert_edge(input: &str) -> IResult<&str, Statement> {
    let row = tuple((
        vid,
        preceded(pair(sym('-'), char('>')), vid),
        preceded(sym(':'), parens(literal)),
    ));
    map(
        tuple((
            preceded(kw("EDGE"), if_not_exists),
            identifier,
            parens(identifier),
            preceded(kw("VALUES"), separated_list1(sym(','), row)),
        )),
        |(if_not_exists, edge, fields, rows)| Statement::InsertEdge {
            if_not_exists,
            edge,
            fields,
            rows,
        },
    )(input)
}

fn update_vertex(input: &str) -> IResult<&str, Statement> {
    map(
        tuple((
            preceded(tuple((kw("UPDATE"), kw("VERTEX"), kw("ON"))), identifier),
            vid,
            preceded(
                kw("SET"),
                separated_list1(sym(','), pair(identifier, preceded(sym('='), literal))),
            ),
        )),
        |(tag, vid, assignments)| Statement::UpdateVertex {
            tag,
            vid,
            assignments,
        },
    )(input)
}

fn match_query(input: &str) -> IResult<&str, Statement> {
    let (input, _) = pair(kw("MATCH"), sym('('))(input)?;
    let (input, _var) = identifier(input)?;
    let returning = || preceded(kw("RETURN"), identifier);
    alt((
        map(
            terminated(preceded(sym(':'), identifier), pair(sym(')'), returning())),
            Statement::MatchTag,
        ),
        map(
            delimited(
                tuple((
                    sym(')'),
                    kw("WHERE"),
                    kw("id"),
                    sym('('),
                    identifier,
                    sym(')'),
                    preceded(multispace0, tag("==")),
                )),
                vid,
                returning(),
            ),
            Statement::MatchId,
        ),
    ))(input)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn literals() {
        assert_eq!(parse_literal("NULL").unwrap(), Value::Null);
        assert_eq!(parse_literal("true").unwrap(), Value::Bool(true));
        assert_eq!(parse_literal("-42").unwrap(), Value::Int(-42));
        assert_eq!(parse_literal("123.45").unwrap(), Value::Float(123.45));
        assert_eq!(parse_literal("1e-7").unwrap(), Value::Float(1e-7));
        assert_eq!(parse_literal("\"\"").unwrap(), Value::from(""));
        assert_eq!(
            parse_literal(r#""hello \"world\"\n""#).unwrap(),
            Value::from("hello \"world\"\n")
        );
        let ts = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(
            parse_literal("datetime(\"2023-01-01T12:00:00\")").unwrap(),
            Value::Timestamp(ts)
        );
        assert!(parse_literal("\"unterminated").is_err());
    }

    #[test]
    fn create_space_with_options() {
        let stmt = parse_statement(
            "CREATE SPACE IF NOT EXISTS ns1 (partition_num = 10, replica_factor = 1, vid_type = FIXED_STRING(32))",
        )
        .unwrap();
        assert_eq!(
            stmt,
            Statement::CreateSpace {
                name: "ns1".into(),
                if_not_exists: true,
                partition_num: 10,
                replica_factor: 1,
                vid_type: VidType::FixedString(32),
            }
        );
    }

    #[test]
    fn edge_with_defaults() {
        let stmt = parse_statement(
            "CREATE EDGE IF NOT EXISTS has_lib(source_node string DEFAULT \"RootNode\", target_node string DEFAULT \"LibNode\")",
        )
        .unwrap();
        let Statement::CreateSchema {
            kind, properties, ..
        } = stmt
        else {
            panic!("expected CREATE EDGE");
        };
        assert_eq!(kind, SchemaKind::Edge);
        assert_eq!(properties[1].name, "target_node");
        assert_eq!(properties[1].default, Some(Value::from("LibNode")));

        assert!(matches!(
            parse_statement("CREATE EDGE IF NOT EXISTS has_lib()").unwrap(),
            Statement::CreateSchema { properties, .. } if properties.is_empty()
        ));
    }

    #[test]
    fn tag_index_is_not_a_tag() {
        let stmt =
            parse_statement("CREATE TAG INDEX IF NOT EXISTS idx ON pdf_node(pdf_file_name(100))")
                .unwrap();
        assert_eq!(
            stmt,
            Statement::CreateIndex {
                kind: SchemaKind::Tag,
                name: "idx".into(),
                if_not_exists: true,
                schema: "pdf_node".into(),
                fields: vec![IndexField {
                    name: "pdf_file_name".into(),
                    length: Some(100),
                }],
            }
        );
    }

    #[test]
    fn inserts() {
        let stmt = parse_statement(
            "INSERT VERTEX IF NOT EXISTS root_node (name, age) VALUES \"root\": (\"root\", 3)",
        )
        .unwrap();
        assert_eq!(
            stmt,
            Statement::InsertVertex {
                if_not_exists: true,
                tag: "root_node".into(),
                fields: vec!["name".into(), "age".into()],
                rows: vec![("root".into(), vec![Value::from("root"), Value::Int(3)])],
            }
        );

        let stmt =
            parse_statement("INSERT EDGE IF NOT EXISTS has_lib () VALUES \"root\"->\"lib\":()")
                .unwrap();
        assert_eq!(
            stmt,
            Statement::InsertEdge {
                if_not_exists: true,
                edge: "has_lib".into(),
                fields: vec![],
                rows: vec![("root".into(), "lib".into(), vec![])],
            }
        );
    }

    #[test]
    fn matches_and_updates() {
        assert_eq!(
            parse_statement("MATCH (n:root_node) RETURN n").unwrap(),
            Statement::MatchTag("root_node".into())
        );
        assert_eq!(
            parse_statement("MATCH (n) WHERE id(n) == 'it\\'s' RETURN n").unwrap(),
            Statement::MatchId("it's".into())
        );
        assert_eq!(
            parse_statement("UPDATE VERTEX ON root_node \"root\" SET name = \"new\"").unwrap(),
            Statement::UpdateVertex {
                tag: "root_node".into(),
                vid: "root".into(),
                assignments: vec![("name".into(), Value::from("new"))],
            }
        );
    }

    #[test]
    fn keywords_need_a_boundary() {
        assert!(parse_statement("USEns1").is_err());
        assert_eq!(parse_statement("use ns1;").unwrap(), Statement::Use("ns1".into()));
        let err = parse_statement("SHOW NOTHING").unwrap_err();
        assert!(err.starts_with("SyntaxError"), "{err}");
    }
}
