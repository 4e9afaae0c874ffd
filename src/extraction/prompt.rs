//! Instruction template sent to the model for each report
//!
//! The guideline text is input for the model only; nothing here evaluates it.

use super::schema::Field;

const REPORT_PLACEHOLDER: &str = "{report}";
const OUTPUT_FORMAT_PLACEHOLDER: &str = "{output_format}";

/// Template with `{report}` and `{output_format}` slots
pub const CADRADS_TEMPLATE: &str = r#"@REPORT
```
{report}
```

<Objective>
@REPORT is a radiology report of coronary CT.
You are a cardiac radiologist with 10 years of experience, interpreting 500 cases of coronary CT each year using the CAD-RADS 2.0.
Select the most appropriate CAD-RADS category according to the <Task details> and <CAD-RADS 2.0 guidelines> below.
!!Do not explain the process. Respond strictly in JSON format following the <Output format>.

<Task details>
1. "r/o" OR "suspected" OR "suspicious for" a feature indicates the presence of that feature.
2. Refer to the abbreviations below.
    • p = proximal
    • m = mid
    • d = distal
    • LM = left main coronary artery
    • LAD = left anterior descending artery
    • LCx = left circumflex artery
    • RCA = right coronary artery
    • LCA = left coronary artery
    • Dg = diagonal branch
    • RI = ramus intermedius
    • OM = obtuse marginal branch
    • rPD = right posterior descending artery
    • rPL = right posterolateral branch
    • ISR = in-stent restenosis
    Example:
    "pRCA" = "proximal right coronary artery"
    "m-dLAD" = "mid left anterior descending artery" AND "distal left anterior descending artery"

<CAD-RADS 2.0 guidelines>
1. Category for stenosis severity [0, 1, 2, 3, 4A, 4B, 5, N]
!!Always select the highest category among the possible categories.
    • 5: "Degree of maximal coronary stenosis = 100% (Total or subtotal occlusion)"
    • 4B: "Degree of LM stenosis ≥ 50% but < 100% (Moderate or severe stenosis in LM)" OR "Degree of maximal coronary stenosis ≥ 70% but < 100% (Severe stenosis) in all three coronary vessels (LAD, LCx, RCA)"
    • 4A: "Degree of maximal coronary stenosis ≥ 70% but < 100% (Severe stenosis) in one or two coronary vessels"
    • 3: "Degree of maximal coronary stenosis ≥ 50% but < 70% (Moderate stenosis)"
    • 2: "Degree of maximal coronary stenosis ≥ 25% but < 50% (Mild stenosis)"
    • 1: "Degree of maximal coronary stenosis > 0% but < 25% (Minimal stenosis)"
    • 0: "Degree of maximal coronary stenosis = 0% (No visible stenosis)"
!!EXCEPTION1: If there is at least one coronary segment that is non-diagnostic or limited in evaluation, AND degree of maximal coronary stenosis is < 50%, select "N".
!!EXCEPTION2: When a bypass graft is present, exclude the stenosis of the coronary segment bypassed by the graft and evaluate the graft and the distal coronary segment instead.

2. Category for plaque burden [No, P1, P2, P3, P4]
STEP1: Obtain the Coronary Artery Calcium Score.
STEP2: Calculate the Segment Involvement Score.
    • Count the number of coronary artery segments with plaque among the 16 segments below.
        • 16 segments: LM, pLAD, mLAD, dLAD, 1st Dg, 2nd Dg, RI, pLCx, dLCx, 1st OM, 2nd OM, pRCA, mRCA, dRCA, rPD, rPL
    • !!If segments are described as a range, count each segment in the range. For example, p-dLAD indicates pLAD, mLAD, dLAD, and should be counted as 3 segments.
STEP3: Select the category for plaque burden.
    • If the Coronary Artery Calcium Score is unknown, use the Segment Involvement Score.
    • If there is at least one stent anywhere in the coronary system, use the Segment Involvement Score.
    • If the Coronary Artery Calcium Score is zero, but coronary plaque exists, use the Segment Involvement Score.
    • In all other cases, use the Coronary Artery Calcium Score.
    1) Segment Involvement Score classification:
        • No: 0 segments
        • P1: 1 or 2 segments
        • P2: 3 or 4 segments
        • P3: 5, 6, or 7 segments
        • P4: ≥ 8 segments
    2) Coronary Artery Calcium Score classification:
        • No: Score = 0
        • P1: Score > 0 but ≤ 100
        • P2: Score > 100 but ≤ 300
        • P3: Score > 300 but ≤ 1000
        • P4: Score ≥ 1000

3. Modifier N (non-diagnostic) [N, No]
    • N: If there is at least one coronary segment that is non-diagnostic or limited in evaluation, AND degree of maximal coronary stenosis is ≥ 50%, select "N".
    • No: In all other cases

4. Modifier HRP (high-risk plaque) [HRP, No]
    • HRP: "Plaque with two or more of the following characteristics: positive remodeling, low-attenuation, spotty calcification, napkin-ring sign" OR "presence of high-risk plaque" OR "presence of vulnerable plaque"
    • No: In all other cases

5. Modifier S (stent) [S, No]
    • S: Presence of at least one stent anywhere in the coronary system
    • No: In all other cases

6. Modifier G (graft) [G, No]
    • G: Presence of at least one coronary artery bypass graft
    • No: In all other cases

7. Modifier E (exceptions) [E, No]
    • E: Presence of non-atherosclerotic causes of coronary abnormalities (coronary dissection, anomalous origin of major coronary artery, coronary artery aneurysm or pseudo-aneurysm, coronary vasculitis, coronary artery fistula, extrinsic coronary artery compression, or arteriovenous malformation)
    • No: In all other cases

!!Before providing the output, double-check if categories and modifiers are appropriately selected according to the <CAD-RADS 2.0 Guidelines> and <Task Details>.

<Output format>
{output_format}"#;

/// Renders the instruction prompt for one report
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
    output_format: String,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::with_template(CADRADS_TEMPLATE)
    }

    /// Use a custom template; `{report}` and `{output_format}` are substituted
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            output_format: output_format(),
        }
    }

    pub fn build(&self, report_text: &str) -> String {
        // Output format goes in first so a report containing the literal
        // `{output_format}` is left alone.
        self.template
            .replace(OUTPUT_FORMAT_PLACEHOLDER, &self.output_format)
            .replacen(REPORT_PLACEHOLDER, report_text.trim(), 1)
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON skeleton naming every field in canonical order with its legal values
pub fn output_format() -> String {
    let lines: Vec<String> = Field::ALL
        .iter()
        .map(|field| {
            format!(
                "\"{}\": \"string({})\"",
                field.key(),
                field.domain().join(", ")
            )
        })
        .collect();
    format!("{{\n{}\n}}", lines.join(",\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_embeds_report() {
        let prompt = PromptBuilder::new().build("  LAD 50-69% stenosis.  ");
        assert!(prompt.starts_with("@REPORT\n```\nLAD 50-69% stenosis.\n```"));
        assert!(!prompt.contains(REPORT_PLACEHOLDER));
        assert!(!prompt.contains(OUTPUT_FORMAT_PLACEHOLDER));
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = PromptBuilder::new();
        assert_eq!(builder.build("CAC 0"), builder.build("CAC 0"));
    }

    #[test]
    fn test_output_format_lists_fields_in_order() {
        let format = output_format();
        let mut last = 0;
        for field in Field::ALL {
            let pos = format.find(field.key()).unwrap();
            assert!(pos >= last, "{} out of order", field.key());
            last = pos;
        }
        assert!(format.contains("\"Category for stenosis severity\": \"string(0, 1, 2, 3, 4A, 4B, 5, N)\""));
        assert!(format.contains("\"Modifier E\": \"string(No, E)\""));
    }

    #[test]
    fn test_output_format_is_json() {
        let value: serde_json::Value = serde_json::from_str(&output_format()).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 7);
    }

    #[test]
    fn test_prompt_contains_guidance() {
        let prompt = PromptBuilder::new().build("report");
        assert!(prompt.contains("<Task details>"));
        assert!(prompt.contains("ISR = in-stent restenosis"));
        assert!(prompt.contains("<CAD-RADS 2.0 guidelines>"));
        assert!(prompt.contains("double-check"));
        assert!(prompt.ends_with("}"));
    }

    #[test]
    fn test_report_with_braces_is_not_expanded() {
        let prompt = PromptBuilder::new().build("see {output_format} and {report}");
        assert!(prompt.contains("see {output_format} and {report}"));
    }

    #[test]
    fn test_custom_template() {
        let builder = PromptBuilder::with_template("R: {report}");
        assert_eq!(builder.build("x"), "R: x");
    }
}
