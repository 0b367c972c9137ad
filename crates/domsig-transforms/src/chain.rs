#![forbid(unsafe_code)]

//! Running a list of transforms in order.

use crate::data::{DataKind, TransformData};
use crate::transform::Transform;
use crate::TransformEnv;
use domsig_core::Error;
use std::io::Write;

/// Apply `transforms[start..]` to `input`, left to right.
///
/// `start` is the number of transforms already applied to `input`. A
/// failing step is reported as a transform error naming its algorithm.
pub fn apply(
    transforms: &[Transform],
    input: TransformData,
    env: &TransformEnv<'_>,
    start: usize,
) -> Result<TransformData, Error> {
    let mut data = input;
    for (position, transform) in transforms.iter().enumerate().skip(start) {
        tracing::debug!(algorithm = transform.algorithm(), position, "applying transform");
        data = transform
            .execute(data, env, position)
            .map_err(|e| Error::transform(transform.algorithm(), e))?;
    }
    Ok(data)
}

/// Like [`apply`], but the last step writes its octet form into `out`
/// instead of materializing it.
pub fn apply_into<W: Write>(
    transforms: &[Transform],
    input: TransformData,
    env: &TransformEnv<'_>,
    start: usize,
    out: &mut W,
) -> Result<(), Error> {
    let Some((last, init)) = transforms.split_last().filter(|_| start < transforms.len()) else {
        return input.write_octets(out);
    };
    let data = apply(init, input, env, start)?;
    let position = init.len();
    tracing::debug!(algorithm = last.algorithm(), position, "streaming final transform");
    last.execute_into(data, env, position, out)
        .map_err(|e| Error::transform(last.algorithm(), e))
}

/// The kind of data the chain ends with, worked out without running it.
pub fn output_kind(transforms: &[Transform], input: DataKind) -> DataKind {
    transforms
        .iter()
        .fold(input, |kind, transform| transform.output_kind(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xpath_filter::XPathFilter;
    use domsig_c14n::C14nMode;
    use std::sync::Arc;

    const XML: &str = r#"<doc xmlns:p="urn:p"><!--note--><p:a Id="a">text</p:a><b>YWJj</b><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"/></doc>"#;

    fn env_for(xml: &Arc<str>) -> TransformEnv<'static> {
        let doc = domsig_xml::parse(xml).unwrap();
        let sig = doc
            .descendants()
            .find(|n| n.has_tag_name((domsig_core::ns::DSIG, "Signature")))
            .unwrap();
        let mut env = TransformEnv::for_document(Arc::clone(xml));
        env.signature = Some(sig.id().get_usize());
        env
    }

    fn chains() -> Vec<Vec<Transform>> {
        vec![
            vec![],
            vec![Transform::EnvelopedSignature],
            vec![
                Transform::EnvelopedSignature,
                Transform::c14n(C14nMode::ExclusiveWithComments),
            ],
            vec![
                Transform::XPath(XPathFilter::new("not(self::comment())").unwrap()),
                Transform::c14n(C14nMode::Inclusive11WithComments),
            ],
            vec![Transform::c14n(C14nMode::Inclusive), Transform::c14n(C14nMode::Exclusive)],
        ]
    }

    #[test]
    fn test_streaming_matches_materialized() {
        let xml: Arc<str> = Arc::from(XML);
        let env = env_for(&xml);
        for chain in chains() {
            let input = TransformData::Subtree {
                xml: Arc::clone(&xml),
                root: 0,
                with_comments: true,
            };
            let materialized = apply(&chain, input.clone(), &env, 0)
                .unwrap()
                .into_octets()
                .unwrap();
            let mut streamed = Vec::new();
            apply_into(&chain, input, &env, 0, &mut streamed).unwrap();
            assert_eq!(streamed, materialized, "chain {chain:?}");
        }
    }

    #[test]
    fn test_enveloped_then_exclusive() {
        let xml: Arc<str> = Arc::from(XML);
        let env = env_for(&xml);
        let chain = &chains()[2];
        let out = apply(chain, TransformData::document(Arc::clone(&xml)), &env, 0)
            .unwrap()
            .into_octets()
            .unwrap();
        assert_eq!(
            out,
            br#"<doc><p:a xmlns:p="urn:p" Id="a">text</p:a><b>YWJj</b></doc>"#
        );
    }

    #[test]
    fn test_start_skips_applied_transforms() {
        let xml: Arc<str> = Arc::from(XML);
        let env = env_for(&xml);
        let chain = vec![Transform::Base64, Transform::c14n(C14nMode::Inclusive)];
        let pre = TransformData::Octets(b"<x/>".to_vec());
        let out = apply(&chain, pre, &env, 1).unwrap().into_octets().unwrap();
        assert_eq!(out, b"<x></x>");

        let mut streamed = Vec::new();
        apply_into(&chain, TransformData::Octets(b"raw".to_vec()), &env, 2, &mut streamed).unwrap();
        assert_eq!(streamed, b"raw");
    }

    #[test]
    fn test_failures_name_the_transform() {
        let env = TransformEnv::default();
        let err = apply(
            &[Transform::EnvelopedSignature],
            TransformData::Octets(b"x".to_vec()),
            &env,
            0,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Transform { ref algorithm, .. } if algorithm == domsig_core::algorithm::ENVELOPED_SIGNATURE
        ));
    }

    #[test]
    fn test_output_kind() {
        let chain = [Transform::Base64, Transform::EnvelopedSignature];
        assert_eq!(output_kind(&chain, DataKind::Xml), DataKind::Xml);
        assert_eq!(output_kind(&chain[..1], DataKind::Xml), DataKind::Octets);
        assert_eq!(output_kind(&[], DataKind::Octets), DataKind::Octets);
    }
}
