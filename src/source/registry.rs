//! Object key format registry.
//!
//! Each descriptor pairs a filename pattern with parsing instructions for
//! the objects it names. Resolution is an ordered first-match scan; the two
//! descriptors sharing the load-balancer/flow-log filename pattern are told
//! apart by the `type` path segment the pattern captures.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// `lb_type` capture value for network load balancers, whose timestamps lack
/// the zone suffix.
pub const LB_NLB_TYPE: &str = "net";

/// How the per-line timestamp capture is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampKind {
    /// Parsed with the chrono format string.
    String(&'static str),
    /// A fractional Unix timestamp rendered as digits.
    Unix,
}

pub struct FormatDescriptor {
    /// Path segment the filename pattern must capture as `type` for this
    /// descriptor to apply. `None` accepts any match (no `type` capture).
    pub object_type: Option<&'static str>,
    /// Value of the `__aws_log_type` label.
    pub log_type_label: &'static str,
    pub filename_regex: &'static Regex,
    pub timestamp_regex: Option<&'static Regex>,
    pub timestamp_kind: Option<TimestampKind>,
    /// Leading lines (or wrapper tokens, for record-array objects) to skip.
    pub skip_header_count: usize,
    /// Capture whose value becomes the `__aws_<log_type>_owner` label.
    pub owner_label_key: Option<&'static str>,
    pub gzip_compressed: bool,
    /// Objects holding one JSON array of records, decoded incrementally
    /// instead of line by line.
    pub json_records: bool,
    /// Recognized but deliberately not forwarded.
    pub skip: bool,
}

// Load balancer access logs and VPC flow logs share one key layout:
// AWSLogs/<account>/<type>/<region>/<y>/<m>/<d>/<account>_<type>_<region>_....log.gz
static DEFAULT_FILENAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"AWSLogs/(?P<account_id>\d+)/(?P<type>[a-zA-Z0-9_\-]+)/(?P<region>[\w-]+)/(?P<year>\d+)/(?P<month>\d+)/(?P<day>\d+)/\d+_(?:elasticloadbalancing|vpcflowlogs)_\w+-\w+-\d_(?:(?P<lb_type>app|net)\.*?)?(?P<src>[a-zA-Z0-9\-]+)",
    )
    .unwrap()
});
static DEFAULT_TIMESTAMP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<timestamp>\d+-\d+-\d+T\d+:\d+:\d+(?:\.\d+Z)?)").unwrap());

// <account>_CloudTrail_<region>_<end-time>_<hash>.json.gz, optionally under
// an organization prefix.
static CLOUDTRAIL_FILENAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"AWSLogs/(?P<organization_id>o-[a-z0-9]{10,32})?/?(?P<account_id>\d+)/(?P<type>[a-zA-Z0-9_\-]+)/(?P<region>[\w-]+)/(?P<year>\d+)/(?P<month>\d+)/(?P<day>\d+)/\d+_(?:CloudTrail|CloudTrail-Digest)_\w+-\w+-\d_(?:(?:app|nlb|net)\.*?)?.+_(?P<src>[a-zA-Z0-9\-]+)",
    )
    .unwrap()
});

// <prefix>/<distribution>.<yyyy>-<mm>-<dd>-<hh>.<hash>.gz
static CLOUDFRONT_FILENAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<prefix>.*)/(?P<src>[A-Z0-9]+)\.(?P<year>\d+)-(?P<month>\d+)-(?P<day>\d+)-(.+)")
        .unwrap()
});
static CLOUDFRONT_TIMESTAMP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<timestamp>\d+-\d+-\d+\s\d+:\d+:\d+)").unwrap());

// AWSLogs/<account>/WAFLogs/<region>/<web-acl>/<y>/<m>/<d>/<h>/<min>/....log.gz
static WAF_FILENAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"AWSLogs/(?P<account_id>\d+)/(?P<type>WAFLogs)/(?P<region>[\w-]+)/(?P<src>[\w-]+)/(?P<year>\d+)/(?P<month>\d+)/(?P<day>\d+)/(?P<hour>\d+)/(?P<minute>\d+)/\d+_waflogs_[\w-]+_[\w-]+_\d+T\d+Z_\w+",
    )
    .unwrap()
});
static WAF_TIMESTAMP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""timestamp":\s*(?P<timestamp>\d+),"#).unwrap());

static REGISTRY: LazyLock<Vec<FormatDescriptor>> = LazyLock::new(|| {
    vec![
        FormatDescriptor {
            object_type: Some("elasticloadbalancing"),
            log_type_label: "s3_lb",
            filename_regex: &DEFAULT_FILENAME_REGEX,
            timestamp_regex: Some(&DEFAULT_TIMESTAMP_REGEX),
            timestamp_kind: Some(TimestampKind::String("%+")),
            skip_header_count: 0,
            owner_label_key: Some("account_id"),
            gzip_compressed: true,
            json_records: false,
            skip: false,
        },
        FormatDescriptor {
            object_type: Some("vpcflowlogs"),
            log_type_label: "s3_vpc_flow",
            filename_regex: &DEFAULT_FILENAME_REGEX,
            timestamp_regex: Some(&DEFAULT_TIMESTAMP_REGEX),
            timestamp_kind: Some(TimestampKind::String("%+")),
            skip_header_count: 1,
            owner_label_key: Some("account_id"),
            gzip_compressed: true,
            json_records: false,
            skip: false,
        },
        FormatDescriptor {
            object_type: Some("CloudTrail"),
            log_type_label: "s3_cloudtrail",
            filename_regex: &CLOUDTRAIL_FILENAME_REGEX,
            timestamp_regex: None,
            timestamp_kind: None,
            // Wrapper tokens before the record array: `{`, `"Records"`, `[`.
            skip_header_count: 3,
            owner_label_key: Some("account_id"),
            gzip_compressed: true,
            json_records: true,
            skip: false,
        },
        FormatDescriptor {
            object_type: Some("CloudTrail-Digest"),
            log_type_label: "s3_cloudtrail",
            filename_regex: &CLOUDTRAIL_FILENAME_REGEX,
            timestamp_regex: None,
            timestamp_kind: None,
            skip_header_count: 0,
            owner_label_key: None,
            gzip_compressed: true,
            json_records: false,
            skip: true,
        },
        FormatDescriptor {
            object_type: None,
            log_type_label: "s3_cloudfront",
            filename_regex: &CLOUDFRONT_FILENAME_REGEX,
            timestamp_regex: Some(&CLOUDFRONT_TIMESTAMP_REGEX),
            // Tab-separated date and time columns.
            timestamp_kind: Some(TimestampKind::String("%Y-%m-%d\t%H:%M:%S")),
            skip_header_count: 2,
            owner_label_key: Some("prefix"),
            gzip_compressed: true,
            json_records: false,
            skip: false,
        },
        FormatDescriptor {
            object_type: Some("WAFLogs"),
            log_type_label: "s3_waf",
            filename_regex: &WAF_FILENAME_REGEX,
            timestamp_regex: Some(&WAF_TIMESTAMP_REGEX),
            timestamp_kind: Some(TimestampKind::Unix),
            skip_header_count: 0,
            owner_label_key: Some("account_id"),
            gzip_compressed: true,
            json_records: false,
            skip: false,
        },
    ]
});

/// Non-empty named captures of `regex` against `text`.
pub(crate) fn named_captures(regex: &Regex, text: &str) -> Option<HashMap<String, String>> {
    let captures = regex.captures(text)?;
    let mut map = HashMap::new();
    for name in regex.capture_names().flatten() {
        if let Some(value) = captures.name(name) {
            if !value.as_str().is_empty() {
                map.insert(name.to_string(), value.as_str().to_string());
            }
        }
    }
    Some(map)
}

pub enum ResolvedFormat {
    Known {
        descriptor: &'static FormatDescriptor,
        captures: HashMap<String, String>,
    },
    /// A recognized format that is never forwarded.
    Skipped,
    /// Matched only by the operator-supplied pattern.
    Custom { captures: HashMap<String, String> },
}

/// Match an object key against the registry, then the custom pattern.
/// `None` means the key names a format nobody can parse.
pub fn resolve(key: &str, custom_regex: Option<&Regex>) -> Option<ResolvedFormat> {
    for descriptor in REGISTRY.iter() {
        let Some(captures) = named_captures(descriptor.filename_regex, key) else {
            continue;
        };
        if let Some(object_type) = descriptor.object_type {
            if captures.get("type").map(String::as_str) != Some(object_type) {
                continue;
            }
        }
        if descriptor.skip {
            return Some(ResolvedFormat::Skipped);
        }
        return Some(ResolvedFormat::Known {
            descriptor,
            captures,
        });
    }

    if let Some(regex) = custom_regex {
        if let Some(captures) = named_captures(regex, key) {
            return Some(ResolvedFormat::Custom { captures });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALB_KEY: &str = "AWSLogs/123456789012/elasticloadbalancing/us-east-1/2022/01/24/123456789012_elasticloadbalancing_us-east-1_app.my-lb.b13ea9d19f16d015_20220124T0000Z_0.0.0.0_2et2e1mx.log.gz";
    const NLB_KEY: &str = "AWSLogs/123456789012/elasticloadbalancing/us-east-2/2016/05/01/123456789012_elasticloadbalancing_us-east-2_net.my-lb.1234567890abcdef_201605010000Z_2soosksi.log.gz";
    const FLOW_KEY: &str = "AWSLogs/123456789012/vpcflowlogs/us-east-1/2022/01/24/123456789012_vpcflowlogs_us-east-1_fl-1234abcd_20220124T0000Z_fe123456.log.gz";
    const CLOUDTRAIL_KEY: &str = "AWSLogs/123456789012/CloudTrail/us-east-2/2015/08/01/123456789012_CloudTrail_us-east-2_20150801T0210Z_Mu0KsOhtH1ar15ZZ.json.gz";
    const CLOUDTRAIL_DIGEST_KEY: &str = "AWSLogs/123456789012/CloudTrail-Digest/us-east-2/2015/08/01/123456789012_CloudTrail-Digest_us-east-2_20150801T0210Z_Mu0KsOhtH1ar15ZZ.json.gz";
    const CLOUDFRONT_KEY: &str = "example-prefix/EMLARXS9EXAMPLE.2019-11-14-20.RT4KCN4SGK9.gz";
    const WAF_KEY: &str = "aws-waf-logs-test/AWSLogs/111111111111/WAFLogs/us-east-1/TEST-WEBACL/2021/10/28/19/50/111111111111_waflogs_us-east-1_TEST-WEBACL_20211028T1950Z_e0ca43b5.log.gz";

    fn known(key: &str) -> (&'static FormatDescriptor, HashMap<String, String>) {
        match resolve(key, None) {
            Some(ResolvedFormat::Known {
                descriptor,
                captures,
            }) => (descriptor, captures),
            _ => panic!("expected a known format for {:?}", key),
        }
    }

    #[test]
    fn alb_key_resolves_with_owner_and_lb_type() {
        let (descriptor, captures) = known(ALB_KEY);
        assert_eq!(descriptor.log_type_label, "s3_lb");
        assert_eq!(captures["account_id"], "123456789012");
        assert_eq!(captures["lb_type"], "app");
        assert_eq!(captures["src"], "my-lb");
        assert_eq!(captures["region"], "us-east-1");
    }

    #[test]
    fn nlb_key_resolves_to_the_same_format() {
        let (descriptor, captures) = known(NLB_KEY);
        assert_eq!(descriptor.log_type_label, "s3_lb");
        assert_eq!(captures["lb_type"], LB_NLB_TYPE);
    }

    #[test]
    fn type_segment_separates_flow_logs_from_lb_logs() {
        let (descriptor, captures) = known(FLOW_KEY);
        assert_eq!(descriptor.log_type_label, "s3_vpc_flow");
        assert_eq!(descriptor.skip_header_count, 1);
        assert_eq!(captures["type"], "vpcflowlogs");
        assert_eq!(captures["src"], "fl-1234abcd");
    }

    #[test]
    fn cloudtrail_resolves_and_digest_is_skipped() {
        let (descriptor, _) = known(CLOUDTRAIL_KEY);
        assert_eq!(descriptor.log_type_label, "s3_cloudtrail");
        assert!(descriptor.json_records);
        assert!(matches!(
            resolve(CLOUDTRAIL_DIGEST_KEY, None),
            Some(ResolvedFormat::Skipped)
        ));
    }

    #[test]
    fn cloudfront_and_waf_keys_resolve() {
        let (descriptor, captures) = known(CLOUDFRONT_KEY);
        assert_eq!(descriptor.log_type_label, "s3_cloudfront");
        assert_eq!(captures["prefix"], "example-prefix");
        assert_eq!(captures["src"], "EMLARXS9EXAMPLE");

        let (descriptor, captures) = known(WAF_KEY);
        assert_eq!(descriptor.log_type_label, "s3_waf");
        assert_eq!(descriptor.timestamp_kind, Some(TimestampKind::Unix));
        assert_eq!(captures["src"], "TEST-WEBACL");
    }

    #[test]
    fn custom_pattern_is_the_fallback() {
        let custom = Regex::new(r"app-logs/(?P<service>[\w-]+)/").unwrap();
        match resolve("app-logs/checkout/2022-01-24.log", Some(&custom)) {
            Some(ResolvedFormat::Custom { captures }) => {
                assert_eq!(captures["service"], "checkout");
            }
            _ => panic!("expected custom format"),
        }
        // A registry match wins over the custom pattern.
        let greedy = Regex::new(r".*").unwrap();
        assert!(matches!(
            resolve(ALB_KEY, Some(&greedy)),
            Some(ResolvedFormat::Known { .. })
        ));
    }

    #[test]
    fn unknown_keys_resolve_to_none() {
        assert!(resolve("random/object.txt", None).is_none());
        assert!(resolve("", None).is_none());
    }
}
