use chrono::NaiveDate;
use serde::Deserialize;

use crate::meeting::*;

#[derive(Eq, PartialEq, Debug, Clone, Deserialize)]
struct RosterRow {
    id: MemberId,
    name: String,
    membership_number: Option<String>,
    dong: Option<String>,
    ho: Option<String>,
    phone: Option<String>,
    birthdate: Option<NaiveDate>,
    unit_type: Option<String>,
    intention: Option<VoteIntention>,
    registered_on: Option<NaiveDate>,
}

impl RosterRow {
    fn to_member(&self) -> CliResult<VoteMember> {
        let voter_id = match (&self.membership_number, &self.dong, &self.ho) {
            (Some(n), _, _) => VoterId::MembershipNumber(n.clone()),
            (None, Some(dong), Some(ho)) => VoterId::Unit {
                dong: dong.clone(),
                ho: ho.clone(),
            },
            _ => return MissingVoterIdSnafu { member_id: self.id }.fail(),
        };
        Ok(VoteMember {
            id: self.id,
            voter_id,
            name: self.name.clone(),
            phone: self.phone.clone(),
            birthdate: self.birthdate,
            unit_type: self.unit_type.clone(),
            intention: self.intention.unwrap_or_default(),
            registered_on: self.registered_on,
        })
    }
}

/// Reads the members of a meeting from a CSV file with a header row.
pub fn read_roster(path: &str) -> CliResult<Vec<VoteMember>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let mut res: Vec<VoteMember> = Vec::new();
    for row_r in rdr.deserialize() {
        let row: RosterRow = row_r.context(CsvLineParseSnafu { path })?;
        res.push(row.to_member()?);
    }
    info!("read_roster: {}: {} members", path, res.len());
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &str) -> Vec<RosterRow> {
        csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(data.as_bytes())
            .deserialize()
            .collect::<Result<Vec<RosterRow>, csv::Error>>()
            .unwrap()
    }

    #[test]
    fn members_are_identified_by_number_or_unit() {
        let rows = parse(
            "id,name,membership_number,dong,ho,phone,birthdate,unit_type,intention,registered_on\n\
             1,Kim,M-001,,,010-1234-5678,1970-01-02,84A,planned,\n\
             2,Lee,,101,1203,,,,,2024-09-01\n\
             3,Park,,101,,,,,undecided,\n",
        );
        let first = rows[0].to_member().unwrap();
        assert_eq!(first.voter_id, VoterId::MembershipNumber("M-001".to_string()));
        assert_eq!(first.intention, VoteIntention::Planned);
        assert_eq!(first.registered_on, None);

        let second = rows[1].to_member().unwrap();
        assert_eq!(
            second.voter_id,
            VoterId::Unit {
                dong: "101".to_string(),
                ho: "1203".to_string()
            }
        );
        assert_eq!(second.intention, VoteIntention::Undecided);
        assert_eq!(second.registered_on, NaiveDate::from_ymd_opt(2024, 9, 1));

        assert!(rows[2].to_member().is_err());
    }
}
