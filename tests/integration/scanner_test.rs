//! Statement scanner and resolver tests over realistic scripts.

use pretty_assertions::assert_eq;
use sqlrun::db::DatabaseBackend;
use sqlrun::query::{resolve, scan, AmbiguityKind, StatementRange, StatementScanner};

const DUMP: &str = "\
-- MySQL dump 10.13
/*!40101 SET @OLD_CHARACTER_SET_CLIENT=@@CHARACTER_SET_CLIENT */;
/*!40101 SET NAMES utf8mb4 */;

DROP TABLE IF EXISTS `orders`;
CREATE TABLE `orders` (
  `id` int NOT NULL, # primary key
  `note` varchar(64) DEFAULT 'a;b',
  PRIMARY KEY (`id`)
) ENGINE=InnoDB;

INSERT INTO `orders` VALUES (1,'it''s; fine'),(2,'back\\'slash;');

DELIMITER ;;
CREATE TRIGGER `orders_bi` BEFORE INSERT ON `orders` FOR EACH ROW
BEGIN
  SET NEW.note = CONCAT(NEW.note, ';');
END ;;
DELIMITER ;

/* trailing comment; not a statement */
";

/// Checks ordering, bounds and the lossless partition of `buffer`.
fn assert_partition(buffer: &str, ranges: &[StatementRange]) {
    let mut previous_end = 0;
    let mut rebuilt = String::new();
    for range in ranges {
        assert!(range.start >= previous_end, "ranges overlap: {ranges:?}");
        assert!(range.start < range.end, "empty range: {range:?}");
        assert!(buffer.is_char_boundary(range.start));
        assert!(buffer.is_char_boundary(range.end));
        rebuilt.push_str(&buffer[previous_end..range.start]);
        rebuilt.push_str(range.text(buffer));
        previous_end = range.end;
    }
    rebuilt.push_str(&buffer[previous_end..]);
    assert_eq!(rebuilt, buffer);
}

#[test]
fn test_mysql_dump_statements() {
    let scan = StatementScanner::default().scan(DUMP);
    let statements = scan.statements(DUMP);

    assert_eq!(statements.len(), 6, "{statements:#?}");
    assert_eq!(
        statements[0],
        "/*!40101 SET @OLD_CHARACTER_SET_CLIENT=@@CHARACTER_SET_CLIENT */"
    );
    assert_eq!(statements[2], "DROP TABLE IF EXISTS `orders`");
    assert!(statements[3].starts_with("CREATE TABLE `orders`"));
    assert!(statements[3].ends_with(") ENGINE=InnoDB"));
    assert!(statements[4].ends_with("(2,'back\\'slash;')"));
    assert!(statements[5].starts_with("CREATE TRIGGER"));
    assert!(statements[5].ends_with("END"));

    assert_eq!(scan.directives.len(), 2);
    assert_eq!(scan.directives[0].delimiter, ";;");
    assert_eq!(scan.final_delimiter, ";");
    assert!(scan.ambiguities.is_empty());
    assert_partition(DUMP, &scan.ranges);
}

#[test]
fn test_directive_lines_belong_to_no_statement() {
    let scan = StatementScanner::default().scan(DUMP);
    for directive in &scan.directives {
        assert!(scan
            .ranges
            .iter()
            .all(|r| !r.overlaps(directive.start, directive.end)));
    }
}

#[test]
fn test_delimiter_switch_example() {
    let buffer = "SELECT 1;\nDELIMITER //\nSELECT 2; SELECT 3//";
    let ranges = scan(buffer, ";");
    let texts: Vec<_> = ranges.iter().map(|r| r.text(buffer)).collect();
    assert_eq!(texts, vec!["SELECT 1", "SELECT 2; SELECT 3"]);
    assert_partition(buffer, &ranges);
}

#[test]
fn test_rescan_is_identical() {
    let scanner = StatementScanner::default();
    assert_eq!(scanner.scan(DUMP), scanner.scan(DUMP));
}

#[test]
fn test_postgres_function_body() {
    let buffer = "CREATE FUNCTION inc(i int) RETURNS int AS $body$\n\
                  BEGIN\n  RETURN i + 1;\nEND;\n$body$ LANGUAGE plpgsql;\n\
                  SELECT inc(1);";
    let scanner = StatementScanner::default().with_options(DatabaseBackend::Postgres.scan_options());
    let scan = scanner.scan(buffer);
    let statements = scan.statements(buffer);

    assert_eq!(statements.len(), 2);
    assert!(statements[0].ends_with("$body$ LANGUAGE plpgsql"));
    assert_eq!(statements[1], "SELECT inc(1)");

    // MySQL has no dollar quoting, so the body splits
    let mysql = StatementScanner::default().scan(buffer);
    assert!(mysql.ranges.len() > 2);
}

#[test]
fn test_postgres_operators_and_plain_strings() {
    let scanner = StatementScanner::default().with_options(DatabaseBackend::Postgres.scan_options());

    let buffer = "SELECT data #> '{a}' FROM t; SELECT 2;";
    assert_eq!(
        scanner.scan(buffer).statements(buffer),
        vec!["SELECT data #> '{a}' FROM t", "SELECT 2"]
    );

    let buffer = "SELECT 'C:\\'; SELECT 2;";
    let scan = scanner.scan(buffer);
    assert_eq!(scan.statements(buffer), vec!["SELECT 'C:\\'", "SELECT 2"]);
    assert!(scan.ambiguities.is_empty());
}

#[test]
fn test_unterminated_quote_runs_to_end() {
    let buffer = "SELECT 1; SELECT 'oops; SELECT 2;";
    let scan = StatementScanner::default().scan(buffer);

    assert_eq!(scan.statements(buffer), vec!["SELECT 1", "SELECT 'oops; SELECT 2;"]);
    assert_eq!(scan.ambiguities.len(), 1);
    assert_eq!(scan.ambiguities[0].kind, AmbiguityKind::SingleQuote);
    assert_eq!(scan.ambiguities[0].opened_at, 17);
    assert!(!scan.ranges[1].is_terminated());
}

#[test]
fn test_partition_holds_for_assorted_buffers() {
    let buffers = [
        "",
        ";",
        ";;;",
        "   \n\t",
        "SELECT 1",
        "SELECT 1;;SELECT 2",
        "-- only a comment",
        "/* block */ SELECT 1 /* tail */;",
        "SELECT \"a;b\", `c;d` FROM t; # note; here\nSELECT 2",
        "SELECT 'é;ü'; SELECT '日本';",
        "SELECT 1 -- trailing; comment\n; SELECT 2",
        "DELIMITER $$\nCREATE PROCEDURE p() BEGIN SELECT 1; END$$\nDELIMITER ;\nCALL p();",
    ];
    for buffer in buffers {
        let ranges = scan(buffer, ";");
        assert_partition(buffer, &ranges);
        for range in &ranges {
            assert!(!range.text(buffer).trim().is_empty());
        }
    }
}

#[test]
fn test_resolve_look_behind_after_delimiter() {
    let buffer = "SELECT 1;SELECT 2;";
    let ranges = scan(buffer, ";");
    // one character past the first delimiter
    let caret = 9;

    let behind = resolve(&ranges, caret, true).unwrap();
    assert_eq!(behind.text(buffer), "SELECT 1");

    let ahead = resolve(&ranges, caret, false).unwrap();
    assert_eq!(ahead.text(buffer), "SELECT 2");

    // past the last delimiter there is nothing ahead
    assert_eq!(resolve(&ranges, buffer.len(), false), None);
    assert_eq!(
        resolve(&ranges, buffer.len(), true).map(|r| r.text(buffer)),
        Some("SELECT 2")
    );
}
