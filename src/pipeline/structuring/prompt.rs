/// Default number of OCR characters passed to the model.
pub const DEFAULT_PROMPT_TEXT_BUDGET: usize = 8000;

/// Appended when the OCR text was cut to fit the budget.
pub const TRUNCATION_MARKER: &str = "\n[... texto do OCR truncado ...]";

pub const EXTRACTION_INSTRUCTIONS: &str = r#"Você é um especialista em análise de boletins escolares. Extraia TODOS os dados do boletim e retorne APENAS um JSON válido, sem texto adicional.

Estrutura esperada do JSON:
{
  "aluno": "NOME COMPLETO DO ALUNO",
  "matricula": "NÚMERO DA MATRÍCULA",
  "turma": "CÓDIGO DA TURMA (ex: 7A, 7B)",
  "ano": 2024,
  "bimestre": "1º Bimestre",
  "disciplinas": [
    {
      "nome": "NOME DA DISCIPLINA (exatamente como aparece)",
      "faltas": 0,
      "notas": [10.0, 9.5, null],
      "pontos_extras": 0,
      "media_provisoria": 9.75,
      "media_parcial": 10.0
    }
  ]
}

REGRAS IMPORTANTES:
1. Extraia TODAS as disciplinas encontradas no boletim (pode variar de 13 a 25+ dependendo da série).
2. "notas" tem sempre 3 posições (1ª AV, 2ª AV, 3ª AV); use null quando não houver nota.
3. As notas devem ser números decimais; valores vazios ou traços (-) devem ser null.
4. Mantenha os nomes das disciplinas EXATAMENTE como aparecem (com acentos e maiúsculas).
5. Se houver subtabelas (ex: Biologia I / Biologia II, Física I / Física II, Literatura / Análise Linguística / Produção de Texto), trate cada uma como uma disciplina separada com seu nome completo.
6. "media_provisoria" e "media_parcial" só quando impressas no boletim; caso contrário use null.
7. Para faltas, use 0 se não houver faltas ou o número exato de faltas.
8. Retorne APENAS o JSON, sem markdown, sem explicações, sem ```json.

Disciplinas comuns (podem variar por série):
- EMPREENDEDORISMO
- FILOSOFIA
- GEOGRAFIA
- HISTÓRIA
- SOCIOLOGIA
- BIOLOGIA (pode ter subtabelas: Biologia I, Biologia II)
- FÍSICA (pode ter subtabelas: Física I, Física II)
- QUÍMICA
- REDAÇÃO
- ÉTICA E CIDADANIA
- CIÊNCIAS
- EDUCAÇÃO FÍSICA
- ENSINO DA ARTE
- ESPANHOL
- INGLÊS
- LÍNGUA PORTUGUESA (pode ter subtabelas: Literatura, Análise Linguística, Produção de Texto)
- MATEMÁTICA
- PROJETO DE VIDA
- UNIDADE CURRICULAR DE HUMANAS
- UNIDADE CURRICULAR DE NATUREZA
- TRAJETÓRIA DE LEITURA E ESCRITA

IMPORTANTE:
- Se uma disciplina tiver subtabelas (ex: Biologia I / Biologia II), trate cada uma como uma disciplina separada.
- Mantenha o nome completo da disciplina/subdisciplina exatamente como aparece.
- Extraia TODAS as disciplinas encontradas, não apenas as listadas acima."#;

/// Cut `text` to at most `budget` characters at a whitespace boundary,
/// appending the truncation marker when anything was removed.
pub fn truncate_for_prompt(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }

    let cut = text
        .char_indices()
        .nth(budget)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let head = &text[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    };

    format!("{}{}", head.trim_end(), TRUNCATION_MARKER)
}

/// Self-contained prompt for single-shot (local) completion.
pub fn build_extraction_prompt(ocr_text: &str, budget: usize) -> String {
    let document = truncate_for_prompt(ocr_text, budget);
    format!(
        "{EXTRACTION_INSTRUCTIONS}\n\nTexto extraído do boletim por OCR:\n<boletim>\n{document}\n</boletim>\n\nRetorne o JSON completo."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_for_prompt("MATEMÁTICA 0 9,0 8,5", 100), "MATEMÁTICA 0 9,0 8,5");
    }

    #[test]
    fn long_text_is_cut_at_whitespace_with_marker() {
        let text = "ARTE 10 HISTÓRIA 9 GEOGRAFIA 8";
        let out = truncate_for_prompt(text, 12);
        assert_eq!(out, format!("ARTE 10{TRUNCATION_MARKER}"));
    }

    #[test]
    fn budget_counts_characters_not_bytes() {
        let text = "ÉÉÉÉÉÉÉÉÉÉ";
        let out = truncate_for_prompt(text, 4);
        assert!(out.starts_with("ÉÉÉÉ"));
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn prompt_embeds_instructions_and_document() {
        let prompt = build_extraction_prompt("QUÍMICA 2 7,5 - -", DEFAULT_PROMPT_TEXT_BUDGET);
        assert!(prompt.starts_with("Você é um especialista"));
        assert!(prompt.contains("<boletim>\nQUÍMICA 2 7,5 - -\n</boletim>"));
        assert!(!prompt.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn instructions_list_common_subjects_and_subtables() {
        assert!(EXTRACTION_INSTRUCTIONS.contains("Disciplinas comuns"));
        assert!(EXTRACTION_INSTRUCTIONS.contains("BIOLOGIA (pode ter subtabelas: Biologia I, Biologia II)"));
        assert!(EXTRACTION_INSTRUCTIONS.contains("Literatura, Análise Linguística, Produção de Texto)"));
        assert!(EXTRACTION_INSTRUCTIONS.contains("não apenas as listadas acima"));

        let prompt = build_extraction_prompt("ARTE 10", DEFAULT_PROMPT_TEXT_BUDGET);
        assert!(prompt.contains("TRAJETÓRIA DE LEITURA E ESCRITA"));
    }

    #[test]
    fn prompt_marks_truncated_document() {
        let text = "linha ".repeat(3000);
        let prompt = build_extraction_prompt(&text, DEFAULT_PROMPT_TEXT_BUDGET);
        assert!(prompt.contains(TRUNCATION_MARKER));
    }
}
