use crate::core::DataType;
use super::common::{column_list, identifier, keyword, keywords, string_body, table_name, unsigned, ws};
use super::expression::expr;
use super::statement::{
    AlterOperation, AlterTableStatement, ColumnDef, CreateTableStatement, DropTableStatement,
    IndexDef, Statement,
};
use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{map, opt, recognize, rest, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

/// `(20)`, `(10,2)` or `('a','b')` after a type name.
fn type_arguments(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('('),
        separated_list1(
            ws(char(',')),
            ws(alt((recognize(unsigned), recognize(string_body)))),
        ),
        char(')'),
    ))(input)
}

/// Type name as written, e.g. `bigint(20) unsigned`. Returns (full name, base word).
fn column_type(input: &str) -> IResult<&str, (String, String)> {
    let (input, base) = ws(take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'))(input)?;
    // DOUBLE PRECISION, CHARACTER VARYING
    let (input, second) = opt(ws(alt((keyword("PRECISION"), keyword("VARYING")))))(input)?;
    let (input, args) = opt(ws(type_arguments))(input)?;
    let (input, flags) = many0(ws(alt((keyword("UNSIGNED"), keyword("SIGNED"), keyword("ZEROFILL")))))(input)?;

    let mut full = base.to_ascii_lowercase();
    if let Some(second) = second {
        full.push(' ');
        full.push_str(&second.to_ascii_lowercase());
    }
    if let Some(args) = args {
        full.push_str(args);
    }
    for flag in flags {
        full.push(' ');
        full.push_str(&flag.to_ascii_lowercase());
    }
    Ok((input, (full, base.to_string())))
}

#[derive(Debug, Clone)]
enum ColumnAttribute {
    NotNull,
    Null,
    AutoIncrement,
    PrimaryKey,
    Unique,
    Default(super::statement::Expr),
    Ignored,
}

fn charset_name(input: &str) -> IResult<&str, &str> {
    preceded(opt(ws(char('='))), ws(take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')))(input)
}

fn column_attribute(input: &str) -> IResult<&str, ColumnAttribute> {
    ws(alt((
        value(ColumnAttribute::NotNull, keywords("NOT NULL")),
        value(ColumnAttribute::Null, keyword("NULL")),
        value(ColumnAttribute::AutoIncrement, keyword("AUTO_INCREMENT")),
        value(ColumnAttribute::AutoIncrement, keyword("AUTOINCREMENT")),
        value(ColumnAttribute::PrimaryKey, keywords("PRIMARY KEY")),
        value(ColumnAttribute::Unique, pair(keyword("UNIQUE"), opt(ws(keyword("KEY"))))),
        value(ColumnAttribute::Ignored, keyword("KEY")),
        map(preceded(keyword("DEFAULT"), ws(expr)), ColumnAttribute::Default),
        value(ColumnAttribute::Ignored, preceded(keywords("ON UPDATE"), ws(expr))),
        value(
            ColumnAttribute::Ignored,
            preceded(keyword("COMMENT"), preceded(opt(ws(char('='))), ws(string_body))),
        ),
        value(
            ColumnAttribute::Ignored,
            preceded(alt((keywords("CHARACTER SET"), keywords("CHARSET"))), charset_name),
        ),
        value(ColumnAttribute::Ignored, preceded(keyword("COLLATE"), charset_name)),
    )))(input)
}

pub fn column_def(input: &str) -> IResult<&str, ColumnDef> {
    let (input, name) = ws(identifier)(input)?;
    let (input, (type_name, base)) = column_type(input)?;
    let (input, attributes) = many0(column_attribute)(input)?;

    let mut def = ColumnDef {
        name,
        data_type: DataType::from_sql_name(&base),
        type_name,
        nullable: true,
        auto_increment: false,
        primary_key: false,
        unique: false,
        default: None,
    };
    for attribute in attributes {
        match attribute {
            ColumnAttribute::NotNull => def.nullable = false,
            ColumnAttribute::Null => def.nullable = true,
            ColumnAttribute::AutoIncrement => {
                def.auto_increment = true;
                def.nullable = false;
            }
            ColumnAttribute::PrimaryKey => {
                def.primary_key = true;
                def.nullable = false;
            }
            ColumnAttribute::Unique => def.unique = true,
            ColumnAttribute::Default(e) => def.default = Some(e),
            ColumnAttribute::Ignored => {}
        }
    }
    Ok((input, def))
}

fn index_kind(input: &str) -> IResult<&str, bool> {
    alt((
        value(true, pair(ws(keyword("UNIQUE")), opt(ws(alt((keyword("KEY"), keyword("INDEX"))))))),
        value(false, pair(ws(alt((keyword("FULLTEXT"), keyword("SPATIAL")))), opt(ws(alt((keyword("KEY"), keyword("INDEX"))))))),
        value(false, ws(alt((keyword("KEY"), keyword("INDEX"))))),
    ))(input)
}

/// `[UNIQUE|FULLTEXT] KEY|INDEX [name] (cols) [USING BTREE]`
fn index_def(input: &str) -> IResult<&str, IndexDef> {
    let (input, unique) = index_kind(input)?;
    let (input, name) = opt(ws(identifier))(input)?;
    let (input, columns) = column_list(input)?;
    let (input, _) = opt(preceded(ws(keyword("USING")), ws(identifier)))(input)?;
    Ok((input, IndexDef { name, columns, unique }))
}

/// `[CONSTRAINT [name]] PRIMARY KEY (cols)`
fn primary_key_def(input: &str) -> IResult<&str, Vec<String>> {
    let (input, _) = opt(preceded(ws(keyword("CONSTRAINT")), opt(ws(identifier))))(input)?;
    let (input, _) = ws(keywords("PRIMARY KEY"))(input)?;
    let (input, _) = opt(preceded(ws(keyword("USING")), ws(identifier)))(input)?;
    column_list(input)
}

/// `[CONSTRAINT name] FOREIGN KEY (..) REFERENCES t (..) [ON DELETE ..]`; parsed and discarded.
fn foreign_key_def(input: &str) -> IResult<&str, ()> {
    let (input, _) = opt(preceded(ws(keyword("CONSTRAINT")), opt(ws(identifier))))(input)?;
    let (input, _) = ws(keywords("FOREIGN KEY"))(input)?;
    let (input, _) = opt(ws(identifier))(input)?;
    let (input, _) = column_list(input)?;
    let (input, _) = ws(keyword("REFERENCES"))(input)?;
    let (input, _) = ws(table_name)(input)?;
    let (input, _) = column_list(input)?;
    let (input, _) = many0(tuple((
        ws(keyword("ON")),
        ws(alt((keyword("DELETE"), keyword("UPDATE")))),
        ws(alt((
            keyword("CASCADE"),
            keyword("RESTRICT"),
            map(keywords("SET NULL"), |()| ""),
            map(keywords("NO ACTION"), |()| ""),
        ))),
    )))(input)?;
    Ok((input, ()))
}

enum TableElement {
    Column(ColumnDef),
    PrimaryKey(Vec<String>),
    Index(IndexDef),
    Ignored,
}

fn table_element(input: &str) -> IResult<&str, TableElement> {
    alt((
        map(primary_key_def, TableElement::PrimaryKey),
        map(foreign_key_def, |()| TableElement::Ignored),
        map(index_def, TableElement::Index),
        map(column_def, TableElement::Column),
    ))(input)
}

pub fn create_table(input: &str) -> IResult<&str, Statement> {
    let (input, _) = ws(keyword("CREATE"))(input)?;
    let (input, _) = opt(ws(keyword("TEMPORARY")))(input)?;
    let (input, _) = ws(keyword("TABLE"))(input)?;
    let (input, if_not_exists) = opt(ws(keywords("IF NOT EXISTS")))(input)?;
    let (input, name) = ws(table_name)(input)?;
    let (input, elements) = delimited(
        ws(char('(')),
        separated_list1(ws(char(',')), table_element),
        ws(char(')')),
    )(input)?;
    // ENGINE=.., DEFAULT CHARSET=.., COLLATE=.. and friends
    let (input, _) = rest(input)?;

    let mut stmt = CreateTableStatement {
        name,
        if_not_exists: if_not_exists.is_some(),
        columns: Vec::new(),
        primary_key: Vec::new(),
        indexes: Vec::new(),
    };
    for element in elements {
        match element {
            TableElement::Column(column) => stmt.columns.push(column),
            TableElement::PrimaryKey(columns) => stmt.primary_key = columns,
            TableElement::Index(index) => stmt.indexes.push(index),
            TableElement::Ignored => {}
        }
    }
    Ok((input, Statement::Create(stmt)))
}

/// `CREATE [UNIQUE] INDEX name ON t (cols)`, treated as ALTER TABLE t ADD INDEX.
pub fn create_index(input: &str) -> IResult<&str, Statement> {
    let (input, _) = ws(keyword("CREATE"))(input)?;
    let (input, unique) = opt(ws(alt((keyword("UNIQUE"), keyword("FULLTEXT")))))(input)?;
    let (input, _) = ws(keyword("INDEX"))(input)?;
    let (input, index_name) = ws(identifier)(input)?;
    let (input, _) = ws(keyword("ON"))(input)?;
    let (input, table) = ws(table_name)(input)?;
    let (input, columns) = column_list(input)?;

    Ok((
        input,
        Statement::Alter(AlterTableStatement {
            name: table,
            operations: vec![AlterOperation::AddIndex(IndexDef {
                name: Some(index_name),
                columns,
                unique: unique.is_some_and(|u| u.eq_ignore_ascii_case("UNIQUE")),
            })],
        }),
    ))
}

fn column_position(input: &str) -> IResult<&str, ()> {
    map(
        opt(ws(alt((
            map(keyword("FIRST"), |_| ()),
            map(preceded(keyword("AFTER"), ws(identifier)), |_| ()),
        )))),
        |_| (),
    )(input)
}

fn alter_operation(input: &str) -> IResult<&str, AlterOperation> {
    alt((
        map(
            preceded(ws(keyword("ADD")), primary_key_def),
            AlterOperation::AddPrimaryKey,
        ),
        map(preceded(ws(keyword("ADD")), index_def), AlterOperation::AddIndex),
        map(
            tuple((ws(keyword("ADD")), opt(ws(keyword("COLUMN"))), column_def, column_position)),
            |(_, _, column, ())| AlterOperation::AddColumn(column),
        ),
        map(ws(keywords("DROP PRIMARY KEY")), |()| AlterOperation::DropPrimaryKey),
        map(
            preceded(
                pair(ws(keyword("DROP")), ws(alt((keyword("INDEX"), keyword("KEY"))))),
                ws(identifier),
            ),
            AlterOperation::DropIndex,
        ),
        map(
            preceded(pair(ws(keyword("DROP")), opt(ws(keyword("COLUMN")))), ws(identifier)),
            AlterOperation::DropColumn,
        ),
        map(
            tuple((ws(keyword("MODIFY")), opt(ws(keyword("COLUMN"))), column_def, column_position)),
            |(_, _, column, ())| AlterOperation::ModifyColumn(column),
        ),
        map(
            tuple((
                ws(keyword("CHANGE")),
                opt(ws(keyword("COLUMN"))),
                ws(identifier),
                column_def,
                column_position,
            )),
            |(_, _, old_name, column, ())| AlterOperation::ChangeColumn { old_name, column },
        ),
    ))(input)
}

pub fn alter_table(input: &str) -> IResult<&str, Statement> {
    let (input, _) = ws(keywords("ALTER TABLE"))(input)?;
    let (input, name) = ws(table_name)(input)?;
    let (input, operations) = separated_list1(ws(char(',')), alter_operation)(input)?;

    Ok((input, Statement::Alter(AlterTableStatement { name, operations })))
}

pub fn drop_table(input: &str) -> IResult<&str, Statement> {
    let (input, _) = ws(keyword("DROP"))(input)?;
    let (input, _) = opt(ws(keyword("TEMPORARY")))(input)?;
    let (input, _) = ws(keyword("TABLE"))(input)?;
    let (input, if_exists) = opt(ws(keywords("IF EXISTS")))(input)?;
    let (input, names) = separated_list1(ws(char(',')), ws(table_name))(input)?;
    let (input, _) = opt(ws(alt((keyword("RESTRICT"), keyword("CASCADE")))))(input)?;

    Ok((
        input,
        Statement::Drop(DropTableStatement {
            names,
            if_exists: if_exists.is_some(),
        }),
    ))
}

pub fn truncate_table(input: &str) -> IResult<&str, Statement> {
    let (input, _) = ws(keyword("TRUNCATE"))(input)?;
    let (input, _) = opt(ws(keyword("TABLE")))(input)?;
    let (input, name) = ws(table_name)(input)?;

    Ok((input, Statement::Truncate(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::statement::Expr;

    fn create(sql: &str) -> CreateTableStatement {
        match create_table(sql) {
            Ok((_, Statement::Create(stmt))) => stmt,
            other => panic!("failed to parse {sql}: {other:?}"),
        }
    }

    #[test]
    fn test_create_table_with_keys() {
        let stmt = create(
            "CREATE TABLE IF NOT EXISTS wp_posts (
                ID bigint(20) unsigned NOT NULL AUTO_INCREMENT,
                post_title text NOT NULL,
                post_status varchar(20) NOT NULL DEFAULT 'publish',
                menu_order int(11) NOT NULL DEFAULT 0,
                post_date datetime NOT NULL DEFAULT '0000-00-00 00:00:00',
                PRIMARY KEY  (ID),
                KEY type_status_date (post_status, post_date, ID),
                UNIQUE KEY title (post_title(191))
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_520_ci",
        );
        assert!(stmt.if_not_exists);
        assert_eq!(stmt.name, "wp_posts");
        assert_eq!(stmt.columns.len(), 5);
        let id = &stmt.columns[0];
        assert_eq!(id.type_name, "bigint(20) unsigned");
        assert_eq!(id.data_type, DataType::Integer);
        assert!(id.auto_increment && !id.nullable);
        assert_eq!(stmt.columns[2].default, Some(Expr::Literal("'publish'".into())));
        assert_eq!(stmt.columns[4].data_type, DataType::Datetime);
        assert_eq!(stmt.primary_key, vec!["ID"]);
        assert_eq!(stmt.indexes.len(), 2);
        assert_eq!(stmt.indexes[0].columns, vec!["post_status", "post_date", "ID"]);
        assert!(stmt.indexes[1].unique);
    }

    #[test]
    fn test_inline_primary_key_and_attributes() {
        let stmt = create(
            "CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR(50) CHARACTER SET utf8 COLLATE utf8_bin NULL COMMENT 'n', \
             updated TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP, \
             kind ENUM('a','b') DEFAULT 'a')",
        );
        assert!(stmt.columns[0].primary_key);
        assert!(stmt.columns[1].nullable);
        assert_eq!(stmt.columns[3].type_name, "enum('a','b')");
        assert!(stmt.columns[2].default.is_some());
    }

    #[test]
    fn test_alter_table_operations() {
        let (rest, stmt) = alter_table(
            "ALTER TABLE t ADD COLUMN age INT DEFAULT 0 AFTER name, DROP COLUMN old, \
             CHANGE title headline VARCHAR(100), MODIFY age BIGINT, ADD INDEX age_idx (age), DROP KEY other",
        )
        .unwrap();
        assert!(rest.is_empty());
        let Statement::Alter(alter) = stmt else {
            panic!("expected alter");
        };
        assert_eq!(alter.operations.len(), 6);
        assert!(matches!(&alter.operations[0], AlterOperation::AddColumn(c) if c.name == "age"));
        assert_eq!(alter.operations[1], AlterOperation::DropColumn("old".into()));
        assert!(matches!(&alter.operations[2], AlterOperation::ChangeColumn { old_name, column } if old_name == "title" && column.name == "headline"));
        assert!(matches!(&alter.operations[4], AlterOperation::AddIndex(i) if i.columns == vec!["age"]));
        assert_eq!(alter.operations[5], AlterOperation::DropIndex("other".into()));
    }

    #[test]
    fn test_drop_and_truncate() {
        let (_, stmt) = drop_table("DROP TABLE IF EXISTS a, `b`").unwrap();
        assert_eq!(
            stmt,
            Statement::Drop(DropTableStatement {
                names: vec!["a".into(), "b".into()],
                if_exists: true
            })
        );
        assert_eq!(truncate_table("TRUNCATE TABLE t").unwrap().1, Statement::Truncate("t".into()));
        assert_eq!(truncate_table("truncate t").unwrap().1, Statement::Truncate("t".into()));
    }

    #[test]
    fn test_create_index() {
        let (_, stmt) = create_index("CREATE UNIQUE INDEX slug ON terms (slug)").unwrap();
        let Statement::Alter(alter) = stmt else {
            panic!("expected alter");
        };
        assert_eq!(alter.name, "terms");
        assert!(matches!(&alter.operations[0], AlterOperation::AddIndex(i) if i.unique));
    }
}
